//! Escalations raised against a complaint
//!
//! The only derived field is `resolved_at`, latched the first time an
//! escalation is written with `resolved = true`.

use crate::latch::Latch;
use crate::models::EscalationReason;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEscalation {
    pub complaint_id: i32,
    pub escalated_by_id: Option<i32>,
    pub escalated_to_id: Option<i32>,
    pub reason: EscalationReason,
    pub notes: String,
    pub resolved: bool,
}

impl NewEscalation {
    pub fn new(complaint_id: i32, reason: EscalationReason) -> Self {
        Self {
            complaint_id,
            escalated_by_id: None,
            escalated_to_id: None,
            reason,
            notes: String::new(),
            resolved: false,
        }
    }

    pub fn by(mut self, user_id: i32) -> Self {
        self.escalated_by_id = Some(user_id);
        self
    }

    pub fn to(mut self, user_id: i32) -> Self {
        self.escalated_to_id = Some(user_id);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Stamp creation time and run the write rules
    pub fn prepare(self, now: DateTime<Utc>) -> UnsavedEscalation {
        let mut escalation = Escalation {
            id: (),
            complaint_id: self.complaint_id,
            escalated_by_id: self.escalated_by_id,
            escalated_to_id: self.escalated_to_id,
            reason: self.reason,
            notes: self.notes,
            resolved: self.resolved,
            created_at: now,
            resolved_at: Latch::unset(),
        };
        escalation.apply_business_rules(now);
        escalation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Escalation<Id = i32> {
    id: Id,
    pub complaint_id: i32,
    pub escalated_by_id: Option<i32>,
    pub escalated_to_id: Option<i32>,
    pub reason: EscalationReason,
    pub notes: String,
    pub resolved: bool,
    created_at: DateTime<Utc>,
    resolved_at: Latch<DateTime<Utc>>,
}

pub type UnsavedEscalation = Escalation<()>;

impl<Id> Escalation<Id> {
    /// Returns `true` if this write latched `resolved_at`.
    pub fn apply_business_rules(&mut self, now: DateTime<Utc>) -> bool {
        self.resolved && self.resolved_at.set(now)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at.value()
    }
}

impl UnsavedEscalation {
    pub(crate) fn with_id(self, id: i32) -> Escalation {
        Escalation {
            id,
            complaint_id: self.complaint_id,
            escalated_by_id: self.escalated_by_id,
            escalated_to_id: self.escalated_to_id,
            reason: self.reason,
            notes: self.notes,
            resolved: self.resolved,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
        }
    }
}

impl Escalation {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub(crate) fn from_stored(
        id: i32,
        complaint_id: i32,
        escalated_by_id: Option<i32>,
        escalated_to_id: Option<i32>,
        reason: EscalationReason,
        notes: String,
        created_at: DateTime<Utc>,
        resolved: bool,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            complaint_id,
            escalated_by_id,
            escalated_to_id,
            reason,
            notes,
            resolved,
            created_at,
            resolved_at: Latch::from_stored(resolved_at),
        }
    }
}

impl std::fmt::Display for Escalation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Escalation #{} for Complaint #{}", self.id, self.complaint_id)
    }
}
