//! Security audit trail.

use crate::history::RingBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Inference,
    AccessDenied,
    CredentialStored,
    CredentialRead,
    KeyRotated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// One entry in the audit trail. Content fields are truncated by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    /// Model id, credential name or key id the action touched.
    pub resource: String,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        resource: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            resource: resource.into(),
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// In-memory audit log that also emits each event on the `meridian::audit`
/// tracing target.
#[derive(Debug)]
pub struct AuditLog {
    events: RingBuffer<AuditEvent>,
}

impl AuditLog {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            events: RingBuffer::new(capacity),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.get_all()
    }

    pub fn events_for(&self, actor: &str) -> Vec<AuditEvent> {
        self.events
            .get_all()
            .into_iter()
            .filter(|e| e.actor == actor)
            .collect()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "meridian::audit",
            actor = %event.actor,
            action = ?event.action,
            resource = %event.resource,
            outcome = ?event.outcome,
            detail = event.detail.as_deref().unwrap_or(""),
            "audit"
        );
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_filter_by_actor() {
        let log = AuditLog::new(10);
        log.record(AuditEvent::new(
            "alice",
            AuditAction::Inference,
            "openai:gpt-4",
            AuditOutcome::Success,
        ));
        log.record(
            AuditEvent::new(
                "bob",
                AuditAction::AccessDenied,
                "openai:gpt-4",
                AuditOutcome::Denied,
            )
            .with_detail("no grant"),
        );

        assert_eq!(log.events().len(), 2);
        let bob = log.events_for("bob");
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].action, AuditAction::AccessDenied);
        assert_eq!(bob[0].detail.as_deref(), Some("no grant"));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let log = AuditLog::new(2);
        for i in 0..5 {
            log.record(AuditEvent::new(
                format!("user-{}", i),
                AuditAction::Inference,
                "m",
                AuditOutcome::Success,
            ));
        }
        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].actor, "user-3");
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let event = AuditEvent::new("a", AuditAction::KeyRotated, "key-2", AuditOutcome::Success);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "key_rotated");
        assert!(json.get("detail").is_none());
    }
}
