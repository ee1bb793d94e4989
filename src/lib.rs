//! complaintdesk - complaint tracking for institutional helpdesks
//!
//! Students submit complaints, staff resolve them, and an SLA window decides
//! when a complaint is late.
//!
//! # Records
//!
//! | Record | Purpose |
//! |--------|---------|
//! | `Complaint` | What a student reported, its status and SLA state |
//! | `Escalation` | A complaint raised to another handler |
//! | `Comment` | Student-visible update or staff-only note |
//! | `Category` | Optional grouping for complaints |
//! | `SlaConfig` | Per-priority response/resolution thresholds (lookup only) |
//! | `User` | Student, staff or admin referenced by the above |
//!
//! # SLA rules
//!
//! Each complaint write recomputes three fields: the deadline (first save
//! only), `resolved_at` (set once when resolved) and `is_sla_breached`
//! (raised once the deadline passes, never lowered).
//!
//! # Quick Start
//!
//! ```no_run
//! use complaintdesk::{Database, NewComplaint, Priority, SlaSettings, Status, UserRole};
//!
//! let db = Database::open_at("helpdesk.db").unwrap();
//! let student = db.create_user("ada", UserRole::Student).unwrap();
//!
//! let mut complaint = db
//!     .create_complaint(
//!         NewComplaint::new(student.id, "Heating broken", "Room 204 is freezing")
//!             .priority(Priority::High),
//!         &SlaSettings::default(),
//!     )
//!     .unwrap();
//!
//! complaint.status = Status::Resolved;
//! db.save_complaint(&mut complaint).unwrap();
//! println!("resolved in {:?}", complaint.time_to_resolve());
//! ```

pub mod complaint;
pub mod config;
pub mod db;
pub mod escalation;
pub mod init;
pub mod latch;
pub mod models;
pub mod schema;

pub use complaint::{Complaint, DeadlineError, NewComplaint, RuleEffects, UnsavedComplaint};
pub use config::{Config, ConfigError, SlaSettings, DEFAULT_RESOLUTION_HOURS};
pub use db::{ComplaintFilter, ComplaintSummary, Database, DbError, StatusCount};
pub use escalation::{Escalation, NewEscalation, UnsavedEscalation};
pub use latch::{Latch, StickyFlag};
pub use models::{
    Category, Comment, EscalationReason, NewCategory, NewComment, NewSlaConfig, Priority,
    SlaConfig, Status, User, UserRole,
};
