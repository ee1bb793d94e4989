//! SQLite database with Diesel ORM
//!
//! Stores complaints, their escalations and comments, plus the users,
//! categories and SLA thresholds they reference. Tables are created on open.
//! Business rules run here, immediately before each insert or update.

use crate::complaint::{Complaint, DeadlineError, NewComplaint, RuleEffects, StoredComplaint};
use crate::config::{SlaSettings, WORKSPACE_DIR};
use crate::escalation::{Escalation, NewEscalation};
use crate::models::{
    Category, Comment, NewCategory, NewComment, NewSlaConfig, Priority, SlaConfig, Status, User,
    UserRole,
};
use crate::schema::*;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::DatabaseErrorKind;
use diesel::sqlite::{Sqlite, SqliteConnection};
use mockable::{Clock, DefaultClock};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use strum::IntoEnumIterator;
use thiserror::Error;

pub const DB_FILE_NAME: &str = "complaintdesk.db";

const MAX_USERNAME_LEN: usize = 150;
const MAX_TITLE_LEN: usize = 200;
const MAX_NAME_LEN: usize = 100;

/// Walk up directory tree to find .complaintdesk folder (like git finds .git)
/// Can be overridden with COMPLAINTDESK_DB_PATH env var
fn get_db_path() -> PathBuf {
    // Check env var first - always takes priority
    if let Ok(path) = std::env::var("COMPLAINTDESK_DB_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let workspace = dir.join(WORKSPACE_DIR);
            if workspace.is_dir() {
                return workspace.join(DB_FILE_NAME);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break, // Reached filesystem root
            }
        }
    }

    // No .complaintdesk found - default to current directory
    PathBuf::from(WORKSPACE_DIR).join(DB_FILE_NAME)
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("already exists: {0}")]
    UniqueViolation(String),
    #[error("referenced record does not exist: {0}")]
    ForeignKeyViolation(String),
    #[error("{0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },
    #[error("stored data is invalid: {0}")]
    Corrupt(String),
    #[error("query error: {0}")]
    Query(diesel::result::Error),
}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DbError::UniqueViolation(info.message().to_string())
            }
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                DbError::ForeignKeyViolation(info.message().to_string())
            }
            other => DbError::Query(other),
        }
    }
}

impl From<DeadlineError> for DbError {
    fn from(e: DeadlineError) -> Self {
        DbError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

// ============================================================================
// Column helpers
// ============================================================================

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("{} '{}': {}", column, value, e)))
}

fn parse_ts_opt(column: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(column, v)).transpose()
}

fn parse_column<T: FromStr>(column: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DbError::Corrupt(format!("unexpected {} value '{}'", column, value)))
}

fn hours_to_column(field: &str, hours: u32) -> Result<i32> {
    i32::try_from(hours).map_err(|_| DbError::Validation(format!("{} is too large: {}", field, hours)))
}

fn hours_from_column(column: &str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| DbError::Corrupt(format!("negative {}: {}", column, value)))
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(DbError::Validation(format!(
            "{} is {} characters long (max {})",
            field, len, max
        )));
    }
    Ok(())
}

// ============================================================================
// Diesel Models
// ============================================================================

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUserRow<'a> {
    username: &'a str,
    role: &'a str,
    created_at: &'a str,
}

#[derive(Queryable, Debug)]
struct UserRow {
    id: i32,
    username: String,
    role: String,
    created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            role: parse_column("users.role", &row.role)?,
            created_at: parse_ts("users.created_at", &row.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = categories)]
struct NewCategoryRow<'a> {
    name: &'a str,
    description: &'a str,
    is_active: bool,
    created_at: &'a str,
}

#[derive(Queryable, Debug)]
struct CategoryRow {
    id: i32,
    name: String,
    description: String,
    is_active: bool,
    created_at: String,
}

impl TryFrom<CategoryRow> for Category {
    type Error = DbError;

    fn try_from(row: CategoryRow) -> Result<Self> {
        Ok(Category {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            created_at: parse_ts("categories.created_at", &row.created_at)?,
        })
    }
}

/// Insertable complaint
#[derive(Insertable)]
#[diesel(table_name = complaints)]
struct NewComplaintRow<'a> {
    student_id: i32,
    assigned_staff_id: Option<i32>,
    category_id: Option<i32>,
    title: &'a str,
    description: &'a str,
    status: &'a str,
    priority: &'a str,
    solution: Option<&'a str>,
    created_at: String,
    updated_at: String,
    resolved_at: Option<String>,
    sla_deadline: Option<String>,
    is_sla_breached: bool,
}

/// Every writable complaint column. `None` clears the column.
#[derive(AsChangeset)]
#[diesel(table_name = complaints)]
#[diesel(treat_none_as_null = true)]
struct ComplaintChanges<'a> {
    student_id: i32,
    assigned_staff_id: Option<i32>,
    category_id: Option<i32>,
    title: &'a str,
    description: &'a str,
    status: &'a str,
    priority: &'a str,
    solution: Option<&'a str>,
    updated_at: String,
    resolved_at: Option<String>,
    sla_deadline: Option<String>,
    is_sla_breached: bool,
}

/// Queryable complaint
#[derive(Queryable, Debug)]
struct ComplaintRow {
    id: i32,
    student_id: i32,
    assigned_staff_id: Option<i32>,
    category_id: Option<i32>,
    title: String,
    description: String,
    status: String,
    priority: String,
    solution: Option<String>,
    created_at: String,
    updated_at: String,
    resolved_at: Option<String>,
    sla_deadline: Option<String>,
    is_sla_breached: bool,
}

impl TryFrom<ComplaintRow> for Complaint {
    type Error = DbError;

    fn try_from(row: ComplaintRow) -> Result<Self> {
        Ok(StoredComplaint {
            id: row.id,
            student_id: row.student_id,
            assigned_staff_id: row.assigned_staff_id,
            category_id: row.category_id,
            title: row.title,
            description: row.description,
            status: parse_column("complaints.status", &row.status)?,
            priority: parse_column("complaints.priority", &row.priority)?,
            solution: row.solution,
            created_at: parse_ts("complaints.created_at", &row.created_at)?,
            updated_at: parse_ts("complaints.updated_at", &row.updated_at)?,
            resolved_at: parse_ts_opt("complaints.resolved_at", row.resolved_at.as_deref())?,
            sla_deadline: parse_ts_opt("complaints.sla_deadline", row.sla_deadline.as_deref())?,
            is_sla_breached: row.is_sla_breached,
        }
        .into())
    }
}

#[derive(Insertable)]
#[diesel(table_name = sla_configs)]
struct NewSlaConfigRow<'a> {
    name: &'a str,
    priority: &'a str,
    response_time_hours: i32,
    resolution_time_hours: i32,
    is_active: bool,
    created_at: &'a str,
    updated_at: &'a str,
}

#[derive(AsChangeset)]
#[diesel(table_name = sla_configs)]
struct SlaConfigChanges<'a> {
    name: &'a str,
    priority: &'a str,
    response_time_hours: i32,
    resolution_time_hours: i32,
    is_active: bool,
    updated_at: &'a str,
}

#[derive(Queryable, Debug)]
struct SlaConfigRow {
    id: i32,
    name: String,
    priority: String,
    response_time_hours: i32,
    resolution_time_hours: i32,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SlaConfigRow> for SlaConfig {
    type Error = DbError;

    fn try_from(row: SlaConfigRow) -> Result<Self> {
        Ok(SlaConfig {
            id: row.id,
            name: row.name,
            priority: parse_column("sla_configs.priority", &row.priority)?,
            response_time_hours: hours_from_column(
                "sla_configs.response_time_hours",
                row.response_time_hours,
            )?,
            resolution_time_hours: hours_from_column(
                "sla_configs.resolution_time_hours",
                row.resolution_time_hours,
            )?,
            is_active: row.is_active,
            created_at: parse_ts("sla_configs.created_at", &row.created_at)?,
            updated_at: parse_ts("sla_configs.updated_at", &row.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = escalations)]
struct NewEscalationRow<'a> {
    complaint_id: i32,
    escalated_by_id: Option<i32>,
    escalated_to_id: Option<i32>,
    reason: &'a str,
    notes: &'a str,
    created_at: String,
    resolved: bool,
    resolved_at: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = escalations)]
#[diesel(treat_none_as_null = true)]
struct EscalationChanges<'a> {
    escalated_by_id: Option<i32>,
    escalated_to_id: Option<i32>,
    reason: &'a str,
    notes: &'a str,
    resolved: bool,
    resolved_at: Option<String>,
}

#[derive(Queryable, Debug)]
struct EscalationRow {
    id: i32,
    complaint_id: i32,
    escalated_by_id: Option<i32>,
    escalated_to_id: Option<i32>,
    reason: String,
    notes: String,
    created_at: String,
    resolved: bool,
    resolved_at: Option<String>,
}

impl TryFrom<EscalationRow> for Escalation {
    type Error = DbError;

    fn try_from(row: EscalationRow) -> Result<Self> {
        Ok(Escalation::from_stored(
            row.id,
            row.complaint_id,
            row.escalated_by_id,
            row.escalated_to_id,
            parse_column("escalations.reason", &row.reason)?,
            row.notes,
            parse_ts("escalations.created_at", &row.created_at)?,
            row.resolved,
            parse_ts_opt("escalations.resolved_at", row.resolved_at.as_deref())?,
        ))
    }
}

#[derive(Insertable)]
#[diesel(table_name = complaint_comments)]
struct NewCommentRow<'a> {
    complaint_id: i32,
    author_id: Option<i32>,
    content: &'a str,
    is_internal: bool,
    created_at: &'a str,
}

#[derive(Queryable, Debug)]
struct CommentRow {
    id: i32,
    complaint_id: i32,
    author_id: Option<i32>,
    content: String,
    is_internal: bool,
    created_at: String,
}

impl TryFrom<CommentRow> for Comment {
    type Error = DbError;

    fn try_from(row: CommentRow) -> Result<Self> {
        Ok(Comment {
            id: row.id,
            complaint_id: row.complaint_id,
            author_id: row.author_id,
            content: row.content,
            is_internal: row.is_internal,
            created_at: parse_ts("complaint_comments.created_at", &row.created_at)?,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ============================================================================
// Query helpers
// ============================================================================

/// Optional filters for [`Database::list_complaints`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplaintFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub student_id: Option<i32>,
    pub assigned_staff_id: Option<i32>,
    pub category_id: Option<i32>,
    pub breached_only: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: Status,
    pub count: usize,
}

/// Counts over every complaint in the database
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ComplaintSummary {
    pub total: usize,
    pub by_status: Vec<StatusCount>,
    pub breached: usize,
    pub overdue: usize,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas. SQLite only enforces foreign keys (and so the
/// cascade / set-null rules) when asked, on every connection.
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        get_db_path()
    }

    /// Open database at default path (respects COMPLAINTDESK_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| DbError::Connection(e.to_string()))?;
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path using the system clock
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(DefaultClock))
    }

    /// Open database at specified path with an explicit clock
    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool, clock };
        db.init_schema()?;
        tracing::debug!(path = %path_str, "opened complaint database");
        Ok(db)
    }

    /// Current time as stored: UTC, microsecond precision
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc().trunc_subsecs(6)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                username TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS complaints (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                student_id INTEGER NOT NULL,
                assigned_staff_id INTEGER,
                category_id INTEGER,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                priority TEXT NOT NULL DEFAULT 'medium',
                solution TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                resolved_at TEXT,
                sla_deadline TEXT,
                is_sla_breached BOOLEAN NOT NULL DEFAULT 0,
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (assigned_staff_id) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS sla_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL,
                priority TEXT NOT NULL UNIQUE,
                response_time_hours INTEGER NOT NULL CHECK (response_time_hours >= 0),
                resolution_time_hours INTEGER NOT NULL CHECK (resolution_time_hours >= 0),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS escalations (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                complaint_id INTEGER NOT NULL,
                escalated_by_id INTEGER,
                escalated_to_id INTEGER,
                reason TEXT NOT NULL DEFAULT 'sla_breach',
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                resolved BOOLEAN NOT NULL DEFAULT 0,
                resolved_at TEXT,
                FOREIGN KEY (complaint_id) REFERENCES complaints(id) ON DELETE CASCADE,
                FOREIGN KEY (escalated_by_id) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (escalated_to_id) REFERENCES users(id) ON DELETE SET NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS complaint_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                complaint_id INTEGER NOT NULL,
                author_id INTEGER,
                content TEXT NOT NULL,
                is_internal BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (complaint_id) REFERENCES complaints(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
            )
        "#).execute(&mut conn)?;

        // Create indexes
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_complaints_created_at ON complaints(created_at)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_complaints_status ON complaints(status)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_complaints_student ON complaints(student_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_complaints_staff ON complaints(assigned_staff_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_complaints_deadline ON complaints(sla_deadline)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_escalations_complaint ON escalations(complaint_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_comments_complaint ON complaint_comments(complaint_id)").execute(&mut conn)?;

        Ok(())
    }

    fn last_insert_id(conn: &mut DbConn) -> Result<i32> {
        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
            .first(conn)?;
        Ok(id)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn create_user(&self, username: &str, role: UserRole) -> Result<User> {
        check_len("username", username, MAX_USERNAME_LEN)?;
        let mut conn = self.get_conn()?;
        let now = self.now();
        let created_at = fmt_ts(now);

        diesel::insert_into(users::table)
            .values(&NewUserRow {
                username,
                role: role.as_ref(),
                created_at: &created_at,
            })
            .execute(&mut conn)?;
        let id = Self::last_insert_id(&mut conn)?;

        tracing::debug!(user_id = id, %role, "user created");
        Ok(User {
            id,
            username: username.to_string(),
            role,
            created_at: now,
        })
    }

    pub fn get_user(&self, id: i32) -> Result<Option<User>> {
        let mut conn = self.get_conn()?;
        users::table
            .filter(users::id.eq(id))
            .first::<UserRow>(&mut conn)
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut conn = self.get_conn()?;
        let rows = users::table
            .order(users::username.asc())
            .load::<UserRow>(&mut conn)?;
        convert_all(rows)
    }

    /// Delete a user. Their submitted complaints go with them; complaints
    /// assigned to them, escalations and comments keep a cleared reference.
    pub fn delete_user(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let deleted = diesel::delete(users::table.filter(users::id.eq(id))).execute(&mut conn)?;
        if deleted > 0 {
            tracing::info!(user_id = id, "user deleted");
        }
        Ok(deleted > 0)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub fn create_category(&self, category: &NewCategory) -> Result<Category> {
        check_len("category name", &category.name, MAX_NAME_LEN)?;
        let mut conn = self.get_conn()?;
        let now = self.now();
        let created_at = fmt_ts(now);

        diesel::insert_into(categories::table)
            .values(&NewCategoryRow {
                name: &category.name,
                description: &category.description,
                is_active: category.is_active,
                created_at: &created_at,
            })
            .execute(&mut conn)?;
        let id = Self::last_insert_id(&mut conn)?;

        Ok(Category {
            id,
            name: category.name.clone(),
            description: category.description.clone(),
            is_active: category.is_active,
            created_at: now,
        })
    }

    pub fn get_category(&self, id: i32) -> Result<Option<Category>> {
        let mut conn = self.get_conn()?;
        categories::table
            .filter(categories::id.eq(id))
            .first::<CategoryRow>(&mut conn)
            .optional()?
            .map(Category::try_from)
            .transpose()
    }

    /// Categories in name order
    pub fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        let mut conn = self.get_conn()?;
        let mut query: categories::BoxedQuery<'_, Sqlite> = categories::table.into_boxed();
        if active_only {
            query = query.filter(categories::is_active.eq(true));
        }
        let rows = query
            .order(categories::name.asc())
            .load::<CategoryRow>(&mut conn)?;
        convert_all(rows)
    }

    pub fn update_category(&self, category: &Category) -> Result<()> {
        check_len("category name", &category.name, MAX_NAME_LEN)?;
        let mut conn = self.get_conn()?;
        let updated = diesel::update(categories::table.filter(categories::id.eq(category.id)))
            .set((
                categories::name.eq(&category.name),
                categories::description.eq(&category.description),
                categories::is_active.eq(category.is_active),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DbError::NotFound {
                entity: "category",
                id: category.id,
            });
        }
        Ok(())
    }

    /// Delete a category; complaints filed under it become uncategorized
    pub fn delete_category(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let deleted =
            diesel::delete(categories::table.filter(categories::id.eq(id))).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // SLA configuration
    // ========================================================================

    pub fn create_sla_config(&self, config: &NewSlaConfig) -> Result<SlaConfig> {
        check_len("SLA name", &config.name, MAX_NAME_LEN)?;
        let response = hours_to_column("response_time_hours", config.response_time_hours)?;
        let resolution = hours_to_column("resolution_time_hours", config.resolution_time_hours)?;
        let mut conn = self.get_conn()?;
        let now = self.now();
        let stamp = fmt_ts(now);

        diesel::insert_into(sla_configs::table)
            .values(&NewSlaConfigRow {
                name: &config.name,
                priority: config.priority.as_ref(),
                response_time_hours: response,
                resolution_time_hours: resolution,
                is_active: config.is_active,
                created_at: &stamp,
                updated_at: &stamp,
            })
            .execute(&mut conn)?;
        let id = Self::last_insert_id(&mut conn)?;

        Ok(SlaConfig {
            id,
            name: config.name.clone(),
            priority: config.priority,
            response_time_hours: config.response_time_hours,
            resolution_time_hours: config.resolution_time_hours,
            is_active: config.is_active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_sla_config(&self, priority: Priority) -> Result<Option<SlaConfig>> {
        let mut conn = self.get_conn()?;
        sla_configs::table
            .filter(sla_configs::priority.eq(priority.as_ref()))
            .first::<SlaConfigRow>(&mut conn)
            .optional()?
            .map(SlaConfig::try_from)
            .transpose()
    }

    /// SLA rows ordered from lowest to highest priority
    pub fn list_sla_configs(&self) -> Result<Vec<SlaConfig>> {
        let mut conn = self.get_conn()?;
        let rows = sla_configs::table.load::<SlaConfigRow>(&mut conn)?;
        let mut configs: Vec<SlaConfig> = convert_all(rows)?;
        configs.sort_by_key(|c| c.priority.rank());
        Ok(configs)
    }

    /// Write an SLA row back, refreshing `updated_at`
    pub fn save_sla_config(&self, config: &mut SlaConfig) -> Result<()> {
        check_len("SLA name", &config.name, MAX_NAME_LEN)?;
        let response = hours_to_column("response_time_hours", config.response_time_hours)?;
        let resolution = hours_to_column("resolution_time_hours", config.resolution_time_hours)?;
        let mut conn = self.get_conn()?;
        let now = self.now();
        let stamp = fmt_ts(now);

        let updated = diesel::update(sla_configs::table.filter(sla_configs::id.eq(config.id)))
            .set(&SlaConfigChanges {
                name: &config.name,
                priority: config.priority.as_ref(),
                response_time_hours: response,
                resolution_time_hours: resolution,
                is_active: config.is_active,
                updated_at: &stamp,
            })
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DbError::NotFound {
                entity: "SLA config",
                id: config.id,
            });
        }
        config.updated_at = now;
        Ok(())
    }

    pub fn delete_sla_config(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let deleted =
            diesel::delete(sla_configs::table.filter(sla_configs::id.eq(id))).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // Complaints
    // ========================================================================

    /// Insert a new complaint. The SLA window comes from `sla`; the
    /// per-priority SLA table is not consulted.
    pub fn create_complaint(&self, mut complaint: NewComplaint, sla: &SlaSettings) -> Result<Complaint> {
        check_len("title", &complaint.title, MAX_TITLE_LEN)?;
        complaint.sla_deadline = complaint.sla_deadline.map(|d| d.trunc_subsecs(6));

        let now = self.now();
        let (unsaved, effects) = complaint.prepare(now, sla)?;
        let mut conn = self.get_conn()?;

        diesel::insert_into(complaints::table)
            .values(&NewComplaintRow {
                student_id: unsaved.student_id,
                assigned_staff_id: unsaved.assigned_staff_id,
                category_id: unsaved.category_id,
                title: &unsaved.title,
                description: &unsaved.description,
                status: unsaved.status.as_ref(),
                priority: unsaved.priority.as_ref(),
                solution: unsaved.solution.as_deref(),
                created_at: fmt_ts(unsaved.created_at()),
                updated_at: fmt_ts(unsaved.updated_at()),
                resolved_at: unsaved.resolved_at().map(fmt_ts),
                sla_deadline: unsaved.sla_deadline().map(fmt_ts),
                is_sla_breached: unsaved.is_sla_breached(),
            })
            .execute(&mut conn)?;
        let id = Self::last_insert_id(&mut conn)?;

        let complaint = unsaved.with_id(id);
        tracing::info!(
            complaint_id = id,
            student_id = complaint.student_id,
            priority = %complaint.priority,
            deadline = ?complaint.sla_deadline(),
            "complaint created"
        );
        log_rule_effects(id, &effects);
        Ok(complaint)
    }

    pub fn get_complaint(&self, id: i32) -> Result<Option<Complaint>> {
        let mut conn = self.get_conn()?;
        complaints::table
            .filter(complaints::id.eq(id))
            .first::<ComplaintRow>(&mut conn)
            .optional()?
            .map(Complaint::try_from)
            .transpose()
    }

    /// Apply the business rules at the current time and write the complaint.
    /// `complaint` is only updated once the write succeeds.
    pub fn save_complaint(&self, complaint: &mut Complaint) -> Result<RuleEffects> {
        check_len("title", &complaint.title, MAX_TITLE_LEN)?;
        let mut conn = self.get_conn()?;
        let mut next = complaint.clone();
        let effects = next.apply_business_rules(self.now());

        let updated = diesel::update(complaints::table.filter(complaints::id.eq(next.id())))
            .set(&ComplaintChanges {
                student_id: next.student_id,
                assigned_staff_id: next.assigned_staff_id,
                category_id: next.category_id,
                title: &next.title,
                description: &next.description,
                status: next.status.as_ref(),
                priority: next.priority.as_ref(),
                solution: next.solution.as_deref(),
                updated_at: fmt_ts(next.updated_at()),
                resolved_at: next.resolved_at().map(fmt_ts),
                sla_deadline: next.sla_deadline().map(fmt_ts),
                is_sla_breached: next.is_sla_breached(),
            })
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DbError::NotFound {
                entity: "complaint",
                id: next.id(),
            });
        }
        *complaint = next;

        tracing::debug!(complaint_id = complaint.id(), status = %complaint.status, "complaint saved");
        log_rule_effects(complaint.id(), &effects);
        Ok(effects)
    }

    /// Complaints matching `filter`, newest first
    pub fn list_complaints(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>> {
        let mut conn = self.get_conn()?;
        let mut query: complaints::BoxedQuery<'_, Sqlite> = complaints::table.into_boxed();

        if let Some(status) = filter.status {
            query = query.filter(complaints::status.eq(status.to_string()));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(complaints::priority.eq(priority.to_string()));
        }
        if let Some(student_id) = filter.student_id {
            query = query.filter(complaints::student_id.eq(student_id));
        }
        if let Some(staff_id) = filter.assigned_staff_id {
            query = query.filter(complaints::assigned_staff_id.eq(staff_id));
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(complaints::category_id.eq(category_id));
        }
        if filter.breached_only {
            query = query.filter(complaints::is_sla_breached.eq(true));
        }

        let rows = query
            .order((complaints::created_at.desc(), complaints::id.desc()))
            .load::<ComplaintRow>(&mut conn)?;
        convert_all(rows)
    }

    /// Delete a complaint along with its escalations and comments
    pub fn delete_complaint(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let deleted =
            diesel::delete(complaints::table.filter(complaints::id.eq(id))).execute(&mut conn)?;
        if deleted > 0 {
            tracing::info!(complaint_id = id, "complaint deleted");
        }
        Ok(deleted > 0)
    }

    /// Re-save every complaint whose deadline has passed but whose breach
    /// flag is still down. Returns how many were latched.
    pub fn refresh_sla_breaches(&self) -> Result<usize> {
        let cutoff = fmt_ts(self.now());
        let rows = {
            let mut conn = self.get_conn()?;
            complaints::table
                .filter(complaints::is_sla_breached.eq(false))
                .filter(complaints::sla_deadline.lt(cutoff.as_str()))
                .order(complaints::id.asc())
                .load::<ComplaintRow>(&mut conn)?
        };

        let mut latched = 0;
        for row in rows {
            let mut complaint: Complaint = row.try_into()?;
            if self.save_complaint(&mut complaint)?.breach_latched {
                latched += 1;
            }
        }
        tracing::info!(latched, "SLA breach sweep finished");
        Ok(latched)
    }

    pub fn complaint_summary(&self) -> Result<ComplaintSummary> {
        let all = self.list_complaints(&ComplaintFilter::default())?;
        let now = self.now();

        let by_status = Status::iter()
            .map(|status| StatusCount {
                status,
                count: all.iter().filter(|c| c.status == status).count(),
            })
            .collect();

        Ok(ComplaintSummary {
            total: all.len(),
            by_status,
            breached: all.iter().filter(|c| c.is_sla_breached()).count(),
            overdue: all.iter().filter(|c| c.is_overdue(now)).count(),
        })
    }

    // ========================================================================
    // Escalations
    // ========================================================================

    pub fn create_escalation(&self, escalation: NewEscalation) -> Result<Escalation> {
        let unsaved = escalation.prepare(self.now());
        let mut conn = self.get_conn()?;

        diesel::insert_into(escalations::table)
            .values(&NewEscalationRow {
                complaint_id: unsaved.complaint_id,
                escalated_by_id: unsaved.escalated_by_id,
                escalated_to_id: unsaved.escalated_to_id,
                reason: unsaved.reason.as_ref(),
                notes: &unsaved.notes,
                created_at: fmt_ts(unsaved.created_at()),
                resolved: unsaved.resolved,
                resolved_at: unsaved.resolved_at().map(fmt_ts),
            })
            .execute(&mut conn)?;
        let id = Self::last_insert_id(&mut conn)?;

        let escalation = unsaved.with_id(id);
        tracing::info!(
            escalation_id = id,
            complaint_id = escalation.complaint_id,
            reason = %escalation.reason,
            "complaint escalated"
        );
        Ok(escalation)
    }

    pub fn get_escalation(&self, id: i32) -> Result<Option<Escalation>> {
        let mut conn = self.get_conn()?;
        escalations::table
            .filter(escalations::id.eq(id))
            .first::<EscalationRow>(&mut conn)
            .optional()?
            .map(Escalation::try_from)
            .transpose()
    }

    /// Apply the escalation rules and write it back.
    /// Returns `true` if this save latched `resolved_at`. `escalation` is
    /// only updated once the write succeeds.
    pub fn save_escalation(&self, escalation: &mut Escalation) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let mut next = escalation.clone();
        let latched = next.apply_business_rules(self.now());

        let updated = diesel::update(escalations::table.filter(escalations::id.eq(next.id())))
            .set(&EscalationChanges {
                escalated_by_id: next.escalated_by_id,
                escalated_to_id: next.escalated_to_id,
                reason: next.reason.as_ref(),
                notes: &next.notes,
                resolved: next.resolved,
                resolved_at: next.resolved_at().map(fmt_ts),
            })
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DbError::NotFound {
                entity: "escalation",
                id: next.id(),
            });
        }
        *escalation = next;

        if latched {
            tracing::info!(escalation_id = escalation.id(), "escalation resolved");
        }
        Ok(latched)
    }

    /// Escalations for one complaint, newest first
    pub fn list_escalations(&self, complaint_id: i32) -> Result<Vec<Escalation>> {
        let mut conn = self.get_conn()?;
        let rows = escalations::table
            .filter(escalations::complaint_id.eq(complaint_id))
            .order((escalations::created_at.desc(), escalations::id.desc()))
            .load::<EscalationRow>(&mut conn)?;
        convert_all(rows)
    }

    pub fn delete_escalation(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let deleted =
            diesel::delete(escalations::table.filter(escalations::id.eq(id))).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub fn add_comment(&self, comment: &NewComment) -> Result<Comment> {
        let mut conn = self.get_conn()?;
        let now = self.now();
        let created_at = fmt_ts(now);

        diesel::insert_into(complaint_comments::table)
            .values(&NewCommentRow {
                complaint_id: comment.complaint_id,
                author_id: comment.author_id,
                content: &comment.content,
                is_internal: comment.is_internal,
                created_at: &created_at,
            })
            .execute(&mut conn)?;
        let id = Self::last_insert_id(&mut conn)?;

        Ok(Comment {
            id,
            complaint_id: comment.complaint_id,
            author_id: comment.author_id,
            content: comment.content.clone(),
            is_internal: comment.is_internal,
            created_at: now,
        })
    }

    /// Comments on one complaint, oldest first. Internal staff notes are
    /// left out unless `include_internal` is set.
    pub fn list_comments(&self, complaint_id: i32, include_internal: bool) -> Result<Vec<Comment>> {
        let mut conn = self.get_conn()?;
        let mut query: complaint_comments::BoxedQuery<'_, Sqlite> = complaint_comments::table
            .filter(complaint_comments::complaint_id.eq(complaint_id))
            .into_boxed();
        if !include_internal {
            query = query.filter(complaint_comments::is_internal.eq(false));
        }
        let rows = query
            .order((complaint_comments::created_at.asc(), complaint_comments::id.asc()))
            .load::<CommentRow>(&mut conn)?;
        convert_all(rows)
    }

    pub fn delete_comment(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let deleted = diesel::delete(complaint_comments::table.filter(complaint_comments::id.eq(id)))
            .execute(&mut conn)?;
        Ok(deleted > 0)
    }
}

fn log_rule_effects(complaint_id: i32, effects: &RuleEffects) {
    if effects.resolution_latched {
        tracing::info!(complaint_id, "complaint resolved");
    }
    if effects.breach_latched {
        tracing::warn!(complaint_id, "SLA breached");
    }
}
