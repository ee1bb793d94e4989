//! Helpdesk record types
//!
//! Plain records with no derived-field logic live here, along with the
//! enums stored as text columns. Complaints and escalations carry business
//! rules and have their own modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle status of a complaint
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, EnumIter,
    Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Escalated,
    Closed,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::InProgress => "In Progress",
            Status::Resolved => "Resolved",
            Status::Escalated => "Escalated",
            Status::Closed => "Closed",
        }
    }

    /// Resolved and closed complaints no longer count against the SLA clock
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }

    /// Bootstrap badge class used by the web templates
    pub fn badge_class(&self) -> &'static str {
        match self {
            Status::Pending => "bg-warning",
            Status::InProgress => "bg-info",
            Status::Resolved => "bg-success",
            Status::Escalated => "bg-danger",
            Status::Closed => "bg-secondary",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, EnumIter,
    Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }

    /// Sort key, lowest priority first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

/// Why a complaint was escalated
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, EnumIter,
    Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    #[default]
    SlaBreach,
    CustomerRequest,
    Complexity,
    Unresolved,
    Other,
}

impl EscalationReason {
    pub fn label(&self) -> &'static str {
        match self {
            EscalationReason::SlaBreach => "SLA Breach",
            EscalationReason::CustomerRequest => "Customer Request",
            EscalationReason::Complexity => "High Complexity",
            EscalationReason::Unresolved => "Unresolved for Long Time",
            EscalationReason::Other => "Other",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Staff,
    Admin,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// SLA configuration
// ============================================================================

/// Per-priority SLA thresholds.
///
/// This table is a lookup for reporting. Complaint deadlines are computed
/// from [`crate::SlaSettings`], not from these rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlaConfig {
    pub name: String,
    pub priority: Priority,
    pub response_time_hours: u32,
    pub resolution_time_hours: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlaConfig {
    pub id: i32,
    pub name: String,
    pub priority: Priority,
    pub response_time_hours: u32,
    pub resolution_time_hours: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Display for SlaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.name, self.priority.label())
    }
}

// ============================================================================
// Comments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub complaint_id: i32,
    pub author_id: Option<i32>,
    pub content: String,
    /// Staff-only note when true, student-visible update otherwise
    pub is_internal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: i32,
    pub complaint_id: i32,
    pub author_id: Option<i32>,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(Status::InProgress.to_string(), "in_progress");
        assert_eq!(Status::from_str("escalated").unwrap(), Status::Escalated);
        assert!(Status::from_str("open").is_err());
        assert_eq!(Status::default(), Status::Pending);
    }

    #[test]
    fn test_status_badges_cover_every_status() {
        let badges: Vec<&str> = Status::iter().map(|s| s.badge_class()).collect();
        assert_eq!(
            badges,
            vec!["bg-warning", "bg-info", "bg-success", "bg-danger", "bg-secondary"]
        );
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<Status> = Status::iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Status::Resolved, Status::Closed]);
    }

    #[test]
    fn test_priority_defaults_and_rank() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert!(Priority::Urgent.rank() > Priority::High.rank());
        assert_eq!(Priority::from_str("urgent").unwrap(), Priority::Urgent);
    }

    #[test]
    fn test_escalation_reason_names() {
        assert_eq!(EscalationReason::default(), EscalationReason::SlaBreach);
        assert_eq!(EscalationReason::SlaBreach.as_ref(), "sla_breach");
        assert_eq!(
            EscalationReason::from_str("customer_request").unwrap(),
            EscalationReason::CustomerRequest
        );
        assert_eq!(EscalationReason::Unresolved.label(), "Unresolved for Long Time");
    }

    #[test]
    fn test_serde_matches_strum() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let role: UserRole = serde_json::from_str("\"staff\"").unwrap();
        assert_eq!(role, UserRole::Staff);
    }
}
