//! Audit logging for trust-boundary decisions.
//!
//! Every event is emitted via `tracing` with the whole event serialized as JSON
//! in the `audit` field, so the trail is queryable by any log aggregator.
//! Token contents never appear; only subjects and error kinds do.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `login.succeeded` | The authorization service minted a user token |
//! | `login.failed` | A relayed Basic credential was missing, malformed or wrong |
//! | `user_token.rejected` | The gateway refused a bearer user token |
//! | `robot_token.rejected` | An internal service refused a request at the robot gate |
//! | `identity.required` | A route needing `X-User` got an anonymous principal |
//! | `authority.denied` | The principal lacks a required authority |

use serde::Serialize;
use trust_core::TokenError;

use crate::error::AuthError;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"login.succeeded"`).
    pub event: &'static str,
    /// Subject involved, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Request path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Machine-readable failure kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// Individual validation failures, for token rejections.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    /// Authority that was required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    /// Number of roles granted (for `login.succeeded`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_count: Option<usize>,
}

impl AuditEvent {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            subject: None,
            path: None,
            reason: None,
            failures: Vec::new(),
            authority: None,
            role_count: None,
        }
    }

    fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    /// `login.succeeded`
    #[must_use]
    pub fn login_succeeded(subject: &str, role_count: usize) -> Self {
        let mut event = Self::new("login.succeeded");
        event.subject = Some(subject.to_string());
        event.role_count = Some(role_count);
        event
    }

    /// `login.failed`. `subject` is the presented username, if one was decoded.
    #[must_use]
    pub fn login_failed(subject: Option<&str>, error: &AuthError) -> Self {
        let mut event = Self::new("login.failed");
        event.subject = subject.map(str::to_string);
        event.reason = Some(error.kind());
        event
    }

    /// `user_token.rejected`
    #[must_use]
    pub fn user_token_rejected(path: &str, error: &TokenError) -> Self {
        Self::token_rejected("user_token.rejected", path, error)
    }

    /// `robot_token.rejected`. `error` is `None` when no bearer was presented.
    #[must_use]
    pub fn robot_token_rejected(path: &str, error: Option<&TokenError>) -> Self {
        match error {
            Some(error) => Self::token_rejected("robot_token.rejected", path, error),
            None => {
                let mut event = Self::new("robot_token.rejected").with_path(path);
                event.reason = Some(AuthError::MissingTrustHeader.kind());
                event
            }
        }
    }

    /// `identity.required`
    #[must_use]
    pub fn identity_required(path: &str) -> Self {
        let mut event = Self::new("identity.required").with_path(path);
        event.reason = Some(AuthError::IdentityRequired.kind());
        event
    }

    /// `authority.denied`
    #[must_use]
    pub fn authority_denied(path: &str, subject: Option<&str>, authority: &str) -> Self {
        let mut event = Self::new("authority.denied").with_path(path);
        event.subject = subject.map(str::to_string);
        event.reason = Some(AuthError::InsufficientAuthority.kind());
        event.authority = Some(authority.to_string());
        event
    }

    fn token_rejected(name: &'static str, path: &str, error: &TokenError) -> Self {
        let mut event = Self::new(name).with_path(path);
        match error {
            TokenError::Rejected(errors) => {
                event.reason = Some("invalid_token");
                event.failures = errors.iter().map(ToString::to_string).collect();
            }
            TokenError::Malformed(_) => event.reason = Some("malformed_token"),
            TokenError::Signing(_) => event.reason = Some("internal"),
        }
        event
    }

    /// Whether this event records a denial.
    pub fn is_denial(&self) -> bool {
        self.event != "login.succeeded"
    }
}

/// Emit an audit event.
///
/// Denials go out at `WARN`, everything else at `INFO`:
///
/// ```text
/// WARN edge_trust::audit audit={"event":"robot_token.rejected","path":"/whoami",...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) if event.is_denial() => tracing::warn!(audit = %json, "edge-trust audit"),
        Ok(ref json) => tracing::info!(audit = %json, "edge-trust audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trust_core::{ValidationError, ValidationErrors};

    #[test]
    fn login_succeeded_carries_subject() {
        // GIVEN/WHEN: a successful login
        let event = AuditEvent::login_succeeded("bob", 2);

        // THEN: subject is recorded and it is not a denial
        assert_eq!(event.event, "login.succeeded");
        assert_eq!(event.subject.as_deref(), Some("bob"));
        assert!(!event.is_denial());
    }

    #[test]
    fn login_failed_records_kind_not_password() {
        // GIVEN/WHEN: a credential mismatch
        let event = AuditEvent::login_failed(Some("bob"), &AuthError::CredentialMismatch);
        let json = serde_json::to_string(&event).unwrap();

        // THEN: only username and kind are present
        assert!(json.contains("credential_mismatch"));
        assert!(json.contains("bob"));
        assert!(event.is_denial());
    }

    #[test]
    fn robot_rejection_lists_every_failure() {
        // GIVEN: a rejection with two failures
        let errors =
            ValidationErrors::from_vec(vec![ValidationError::WrongSubject, ValidationError::WrongType])
                .unwrap();

        // WHEN: build the event
        let event = AuditEvent::robot_token_rejected("/whoami", Some(&TokenError::Rejected(errors)));

        // THEN: both failures are listed
        assert_eq!(event.event, "robot_token.rejected");
        assert_eq!(event.failures.len(), 2);
        assert_eq!(event.path.as_deref(), Some("/whoami"));
    }

    #[test]
    fn missing_robot_token_is_missing_trust_header() {
        let event = AuditEvent::robot_token_rejected("/", None);
        assert_eq!(event.reason, Some("missing_trust_header"));
    }

    #[test]
    fn events_serialize_to_json() {
        // GIVEN: one of each event
        let events = vec![
            AuditEvent::login_succeeded("bob", 0),
            AuditEvent::login_failed(None, &AuthError::MalformedCredential),
            AuditEvent::user_token_rejected("/api", &TokenError::Malformed("x".into())),
            AuditEvent::robot_token_rejected("/api", None),
            AuditEvent::identity_required("/auth/me"),
            AuditEvent::authority_denied("/admin/ping", Some("bob"), "ROLE_ADMIN"),
        ];

        // WHEN/THEN: all serialize and emit without error
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert!(json["event"].is_string());
            emit(&event);
        }
    }
}
