//! Identity lookup from the persisted dashboard session.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use envmon_link::IdentitySource;

/// Reads `{"user": {"email": ...}}` from a session file on every lookup, so
/// a fresh sign-in is picked up by the next reconnect.
#[derive(Clone, Debug)]
pub struct SessionFileIdentity {
    path: PathBuf,
}

impl SessionFileIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentitySource for SessionFileIdentity {
    fn lookup(&self) -> Option<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "no session file");
                return None;
            }
        };
        let session: Value = match serde_json::from_str(&content) {
            Ok(session) => session,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "session file is not valid JSON");
                return None;
            }
        };
        let email = session
            .pointer("/user/email")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|email| !email.is_empty());
        if email.is_none() {
            warn!(path = %self.path.display(), "session has no user email");
        }
        email.map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envmon_core::logging::capture_logs;

    fn write_session(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("session.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_user_email() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(&dir, r#"{"user": {"email": "ops@example.com", "id": 7}}"#);
        let source = SessionFileIdentity::new(&path);
        assert_eq!(source.lookup().as_deref(), Some("ops@example.com"));
        assert_eq!(source.path(), path.as_path());
    }

    #[test]
    fn rereads_on_each_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(&dir, r#"{"user": {"email": "a@x.com"}}"#);
        let source = SessionFileIdentity::new(&path);
        assert_eq!(source.lookup().as_deref(), Some("a@x.com"));

        let _ = write_session(&dir, r#"{"user": {"email": "b@x.com"}}"#);
        assert_eq!(source.lookup().as_deref(), Some("b@x.com"));
    }

    #[test]
    fn missing_file_yields_none() {
        let (logs, _guard) = capture_logs();
        let dir = tempfile::tempdir().unwrap();
        let source = SessionFileIdentity::new(dir.path().join("absent.json"));
        assert!(source.lookup().is_none());
        assert!(logs.has_message("no session file"));
    }

    #[test]
    fn bad_json_yields_none() {
        let (logs, _guard) = capture_logs();
        let dir = tempfile::tempdir().unwrap();
        let source = SessionFileIdentity::new(write_session(&dir, "{not json"));
        assert!(source.lookup().is_none());
        assert!(logs.has_message("session file is not valid JSON"));
    }

    #[test]
    fn missing_email_yields_none() {
        let (logs, _guard) = capture_logs();
        let dir = tempfile::tempdir().unwrap();
        let source = SessionFileIdentity::new(write_session(&dir, r#"{"user": {"email": "  "}}"#));
        assert!(source.lookup().is_none());
        assert!(logs.has_message("session has no user email"));
        assert!(!logs.has_message("no session file"));
    }
}
