//! Fallback identity lookup used when reconnecting without a stored identity.

/// Supplies the identity for a reconnect when none is stored.
pub trait IdentitySource: Send + Sync {
    /// The identity to connect with, if one can be found.
    fn lookup(&self) -> Option<String>;
}

impl<F> IdentitySource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn lookup(&self) -> Option<String> {
        self()
    }
}

/// Never finds an identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIdentity;

impl IdentitySource for NoIdentity {
    fn lookup(&self) -> Option<String> {
        None
    }
}
