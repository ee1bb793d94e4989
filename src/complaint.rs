//! Complaint records and their SLA rules
//!
//! Every write of a complaint runs [`Complaint::apply_business_rules`]
//! before it reaches the database:
//!
//! 1. On first save only, a missing deadline becomes
//!    `now + SlaSettings::resolution_time_hours`.
//! 2. A resolved complaint gets `resolved_at = now`, once.
//! 3. A complaint past its deadline gets `is_sla_breached = true`, whatever
//!    its status. The flag is never lowered.
//!
//! Identity is tracked in the type: a [`NewComplaint`] becomes an
//! [`UnsavedComplaint`] through [`NewComplaint::prepare`], and the
//! persistence layer turns that into a [`Complaint`] once the row id is known.

use crate::config::SlaSettings;
use crate::latch::{Latch, StickyFlag};
use crate::models::{Priority, Status};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

/// Why a first-save deadline was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadlineError {
    #[error("an SLA window of {hours} hours overflows the calendar")]
    WindowOverflow { hours: u32 },
    #[error("SLA deadline {0} is outside years 0000-9999")]
    OutOfRange(DateTime<Utc>),
}

/// RFC 3339 only has room for four-digit years
pub(crate) fn is_storable(ts: DateTime<Utc>) -> bool {
    (0..=9999).contains(&ts.year())
}

/// What the business rules changed on one write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleEffects {
    pub deadline_assigned: bool,
    pub resolution_latched: bool,
    pub breach_latched: bool,
}

/// Input for a complaint that has never been saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComplaint {
    pub student_id: i32,
    pub assigned_staff_id: Option<i32>,
    pub category_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub solution: Option<String>,
    /// Explicit deadline; when absent one is computed from the SLA settings
    pub sla_deadline: Option<DateTime<Utc>>,
}

impl NewComplaint {
    pub fn new(student_id: i32, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            student_id,
            assigned_staff_id: None,
            category_id: None,
            title: title.into(),
            description: description.into(),
            status: Status::default(),
            priority: Priority::default(),
            solution: None,
            sla_deadline: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn category(mut self, category_id: i32) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn assigned_to(mut self, staff_id: i32) -> Self {
        self.assigned_staff_id = Some(staff_id);
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.sla_deadline = Some(deadline);
        self
    }

    /// Run the first-save rules and stamp creation time.
    ///
    /// Fails when the deadline, given or computed, cannot be stored.
    pub fn prepare(
        self,
        now: DateTime<Utc>,
        sla: &SlaSettings,
    ) -> Result<(UnsavedComplaint, RuleEffects), DeadlineError> {
        let deadline = match self.sla_deadline {
            Some(explicit) => explicit,
            None => now
                .checked_add_signed(sla.resolution_window())
                .ok_or(DeadlineError::WindowOverflow {
                    hours: sla.resolution_time_hours,
                })?,
        };
        if !is_storable(deadline) {
            return Err(DeadlineError::OutOfRange(deadline));
        }

        let mut complaint = Complaint {
            id: (),
            student_id: self.student_id,
            assigned_staff_id: self.assigned_staff_id,
            category_id: self.category_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            solution: self.solution,
            created_at: now,
            updated_at: now,
            resolved_at: Latch::unset(),
            sla_deadline: Latch::from_stored(self.sla_deadline),
            is_sla_breached: StickyFlag::default(),
        };
        let deadline_assigned = complaint.sla_deadline.set(deadline);
        let mut effects = complaint.apply_business_rules(now);
        effects.deadline_assigned = deadline_assigned;
        Ok((complaint, effects))
    }
}

/// A complaint record. `Id` is `i32` once persisted, `()` before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Complaint<Id = i32> {
    id: Id,
    pub student_id: i32,
    pub assigned_staff_id: Option<i32>,
    pub category_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub solution: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Latch<DateTime<Utc>>,
    sla_deadline: Latch<DateTime<Utc>>,
    is_sla_breached: StickyFlag,
}

/// A complaint that has been through the first-save rules but has no row yet
pub type UnsavedComplaint = Complaint<()>;

impl<Id> Complaint<Id> {
    /// Recompute derived fields for a write at `now`.
    ///
    /// Refreshes `updated_at`, latches `resolved_at` if the complaint is
    /// resolved, and raises the breach flag if the deadline has passed.
    pub fn apply_business_rules(&mut self, now: DateTime<Utc>) -> RuleEffects {
        self.updated_at = now;

        let resolution_latched = self.status == Status::Resolved && self.resolved_at.set(now);

        let breach_latched = match self.sla_deadline.value() {
            Some(deadline) if now > deadline => self.is_sla_breached.raise(),
            _ => false,
        };

        RuleEffects {
            deadline_assigned: false,
            resolution_latched,
            breach_latched,
        }
    }

    /// Past the deadline and still open. Unlike the breach flag this is
    /// computed fresh on every call and ignores resolved/closed complaints.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.sla_deadline.value() {
            Some(deadline) if !self.status.is_terminal() => now > deadline,
            _ => false,
        }
    }

    pub fn time_to_resolve(&self) -> Option<Duration> {
        self.resolved_at.value().map(|resolved| resolved - self.created_at)
    }

    pub fn badge_class(&self) -> &'static str {
        self.status.badge_class()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at.value()
    }

    pub fn sla_deadline(&self) -> Option<DateTime<Utc>> {
        self.sla_deadline.value()
    }

    pub fn is_sla_breached(&self) -> bool {
        self.is_sla_breached.is_raised()
    }
}

impl UnsavedComplaint {
    pub(crate) fn with_id(self, id: i32) -> Complaint {
        Complaint {
            id,
            student_id: self.student_id,
            assigned_staff_id: self.assigned_staff_id,
            category_id: self.category_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            solution: self.solution,
            created_at: self.created_at,
            updated_at: self.updated_at,
            resolved_at: self.resolved_at,
            sla_deadline: self.sla_deadline,
            is_sla_breached: self.is_sla_breached,
        }
    }
}

/// Stored column values, used to rebuild a complaint from a row
pub(crate) struct StoredComplaint {
    pub id: i32,
    pub student_id: i32,
    pub assigned_staff_id: Option<i32>,
    pub category_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub solution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub is_sla_breached: bool,
}

impl From<StoredComplaint> for Complaint {
    fn from(s: StoredComplaint) -> Self {
        Complaint {
            id: s.id,
            student_id: s.student_id,
            assigned_staff_id: s.assigned_staff_id,
            category_id: s.category_id,
            title: s.title,
            description: s.description,
            status: s.status,
            priority: s.priority,
            solution: s.solution,
            created_at: s.created_at,
            updated_at: s.updated_at,
            resolved_at: Latch::from_stored(s.resolved_at),
            sla_deadline: Latch::from_stored(s.sla_deadline),
            is_sla_breached: StickyFlag::from_stored(s.is_sla_breached),
        }
    }
}

impl Complaint {
    pub fn id(&self) -> i32 {
        self.id
    }
}

impl std::fmt::Display for Complaint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} - {}", self.id, self.title)
    }
}
