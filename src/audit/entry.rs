//! Audit entry types.
//!
//! Defines the structure of audit log entries for authentication and
//! stream lifecycle events.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// A single audit log entry.
///
/// Passwords and tokens never appear here; entries carry only the
/// username, the action, and the outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp when the event occurred.
    pub timestamp: String,
    /// Unique identifier correlating the entry with server logs.
    pub request_id: Uuid,
    /// The action performed (e.g. "auth.login", "stream.open").
    pub action: String,
    /// Username the action was attempted for.
    pub username: String,
    /// Where the action originated ("api" or "stream").
    pub source: String,
    /// Outcome of the action.
    pub result: AuditResult,
}

impl AuditEntry {
    /// Create an entry for a successful action.
    pub fn success(action: &str, username: &str, source: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            request_id: Uuid::new_v4(),
            action: action.to_string(),
            username: username.to_string(),
            source: source.to_string(),
            result: AuditResult::Success,
        }
    }

    /// Create an entry for a failed action.
    pub fn failure(action: &str, username: &str, source: &str, reason: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            request_id: Uuid::new_v4(),
            action: action.to_string(),
            username: username.to_string(),
            source: source.to_string(),
            result: AuditResult::Failure {
                reason: reason.to_string(),
            },
        }
    }

    /// Correlate the entry with an existing request ID.
    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = id;
        self
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AuditResult {
    /// The action succeeded.
    #[serde(rename = "success")]
    Success,
    /// The action failed.
    #[serde(rename = "failure")]
    Failure {
        /// Sanitized reason, safe for the log.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_entry_serialization() {
        let entry = AuditEntry::success("auth.login", "alice", "api");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"action\":\"auth.login\""));
        assert!(json.contains("\"username\":\"alice\""));
        assert!(json.contains("\"status\":\"success\""));
        assert!(!json.contains("reason"));
    }

    #[test]
    fn test_failure_entry_serialization() {
        let entry = AuditEntry::failure("auth.login", "alice", "api", "invalid credentials");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"status\":\"failure\""));
        assert!(json.contains("\"reason\":\"invalid credentials\""));
    }

    #[test]
    fn test_with_request_id() {
        let id = Uuid::new_v4();
        let entry = AuditEntry::success("stream.open", "alice", "stream").with_request_id(id);
        assert_eq!(entry.request_id, id);
    }
}
