use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::{ColoredString, Colorize};
use complaintdesk::{
    Category, Comment, Complaint, ComplaintFilter, Config, Database, DbError,
    Escalation, EscalationReason, NewCategory, NewComment, NewComplaint, NewEscalation,
    NewSlaConfig, Priority, SlaConfig, SlaSettings, Status, User, UserRole,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "complaintdesk")]
#[command(author, version, about = "Complaint tracking for institutional helpdesks")]
struct Cli {
    /// Show debug logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create .complaintdesk/ with a config file and database
    Init {
        /// SLA window for new complaints, in hours
        #[arg(long, default_value_t = complaintdesk::DEFAULT_RESOLUTION_HOURS)]
        sla_hours: u32,
    },

    /// Manage students, staff and admins
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Manage complaint categories
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },

    /// Manage per-priority SLA thresholds
    Sla {
        #[command(subcommand)]
        action: SlaCommand,
    },

    /// Submit, update and inspect complaints
    Complaint {
        #[command(subcommand)]
        action: ComplaintCommand,
    },

    /// Escalate complaints and resolve escalations
    Escalation {
        #[command(subcommand)]
        action: EscalationCommand,
    },

    /// Comment on complaints
    Comment {
        #[command(subcommand)]
        action: CommentCommand,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Add a user
    Add {
        username: String,
        /// student, staff or admin
        #[arg(short, long, default_value = "student")]
        role: UserRole,
    },
    /// List users
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a user (their submitted complaints are deleted too)
    Delete { id: i32 },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    /// Add a category
    Add {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List categories
    List {
        /// Include inactive categories
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Mark a category inactive
    Deactivate { id: i32 },
    /// Delete a category (complaints become uncategorized)
    Delete { id: i32 },
}

#[derive(Subcommand, Debug)]
enum SlaCommand {
    /// Create or update the thresholds for one priority
    Set {
        priority: Priority,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(long)]
        response_hours: u32,
        #[arg(long)]
        resolution_hours: u32,
        /// Mark the row inactive
        #[arg(long)]
        inactive: bool,
    },
    /// List SLA thresholds
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ComplaintCommand {
    /// Submit a new complaint
    Submit {
        /// Id of the submitting student
        #[arg(short, long)]
        student: i32,
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        description: String,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        #[arg(short, long)]
        category: Option<i32>,
        /// Staff member to assign
        #[arg(short, long)]
        assign: Option<i32>,
        /// Explicit SLA deadline (RFC 3339)
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,
        /// Override the configured SLA window, in hours
        #[arg(long)]
        sla_hours: Option<u32>,
    },
    /// List complaints, newest first
    List {
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        student: Option<i32>,
        #[arg(long)]
        staff: Option<i32>,
        #[arg(long)]
        category: Option<i32>,
        /// Only complaints whose SLA breach has been recorded
        #[arg(long)]
        breached: bool,
        /// Only open complaints past their deadline right now
        #[arg(long)]
        overdue: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one complaint with its escalations and comments
    Show {
        id: i32,
        #[arg(long)]
        json: bool,
    },
    /// Assign a staff member, or clear the assignment when omitted
    Assign { id: i32, staff: Option<i32> },
    /// Change a complaint's status
    Status {
        id: i32,
        status: Status,
        #[arg(short, long)]
        solution: Option<String>,
    },
    /// Mark a complaint resolved with a solution
    Resolve {
        id: i32,
        #[arg(short, long)]
        solution: String,
    },
    /// Delete a complaint with its escalations and comments
    Delete { id: i32 },
    /// Re-save complaints past their deadline so the breach flag is recorded
    CheckSla,
    /// Counts by status plus breached/overdue totals
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum EscalationCommand {
    /// Escalate a complaint
    Create {
        complaint: i32,
        #[arg(short, long, default_value = "sla_breach")]
        reason: EscalationReason,
        /// Id of the user escalating
        #[arg(long)]
        by: Option<i32>,
        /// Id of the user receiving the escalation
        #[arg(long)]
        to: Option<i32>,
        #[arg(short, long, default_value = "")]
        notes: String,
    },
    /// Mark an escalation resolved
    Resolve { id: i32 },
    /// List escalations for a complaint, newest first
    List {
        complaint: i32,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CommentCommand {
    /// Comment on a complaint
    Add {
        complaint: i32,
        content: String,
        #[arg(short, long)]
        author: Option<i32>,
        /// Staff-only note
        #[arg(short, long)]
        internal: bool,
    },
    /// List comments on a complaint, oldest first
    List {
        complaint: i32,
        /// Hide staff-only notes
        #[arg(long)]
        public: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("{0}")]
    Input(String),
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

type CliResult = Result<(), CliError>;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("complaintdesk={default_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> CliResult {
    let config = Config::load();

    match command {
        Command::Init { sla_hours } => {
            let cwd = std::env::current_dir()
                .map_err(|e| CliError::Input(format!("Could not get current directory: {}", e)))?;
            complaintdesk::init::init_project(&cwd, SlaSettings::with_resolution_hours(sla_hours))
                .map_err(CliError::Input)?;
            Ok(())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "complaintdesk", &mut std::io::stdout());
            Ok(())
        }
        Command::User { action } => run_user(&open_db(&config)?, action),
        Command::Category { action } => run_category(&open_db(&config)?, action),
        Command::Sla { action } => run_sla(&open_db(&config)?, action),
        Command::Complaint { action } => run_complaint(&open_db(&config)?, &config, action),
        Command::Escalation { action } => run_escalation(&open_db(&config)?, action),
        Command::Comment { action } => run_comment(&open_db(&config)?, action),
    }
}

/// `COMPLAINTDESK_DB_PATH` wins, then `database.path` from the config, then
/// the nearest `.complaintdesk/` directory.
fn open_db(config: &Config) -> Result<Database, DbError> {
    if std::env::var_os("COMPLAINTDESK_DB_PATH").is_none() {
        if let Some(path) = &config.database.path {
            return Database::open_at(path);
        }
    }
    Database::open()
}

// ============================================================================
// Users, categories, SLA rows
// ============================================================================

fn run_user(db: &Database, action: UserCommand) -> CliResult {
    match action {
        UserCommand::Add { username, role } => {
            let user = db.create_user(&username, role)?;
            println!("{} user #{} {} ({})", "Created".green(), user.id, user.username, user.role);
        }
        UserCommand::List { json } => {
            let users = db.list_users()?;
            if json {
                return print_json(&users);
            }
            if users.is_empty() {
                println!("No users.");
            }
            for User { id, username, role, .. } in users {
                println!("{:>4}  {:<20} {}", id, username, role);
            }
        }
        UserCommand::Delete { id } => report_delete(db.delete_user(id)?, "user", id)?,
    }
    Ok(())
}

fn run_category(db: &Database, action: CategoryCommand) -> CliResult {
    match action {
        CategoryCommand::Add { name, description } => {
            let category = db.create_category(&NewCategory::new(name).with_description(description))?;
            println!("{} category #{} {}", "Created".green(), category.id, category);
        }
        CategoryCommand::List { all, json } => {
            let categories = db.list_categories(!all)?;
            if json {
                return print_json(&categories);
            }
            if categories.is_empty() {
                println!("No categories.");
            }
            for Category { id, name, description, is_active, .. } in categories {
                let state = if is_active { "".normal() } else { " (inactive)".dimmed() };
                println!("{:>4}  {}{}  {}", id, name.bold(), state, description.dimmed());
            }
        }
        CategoryCommand::Deactivate { id } => {
            let mut category = db
                .get_category(id)?
                .ok_or(DbError::NotFound { entity: "category", id })?;
            category.is_active = false;
            db.update_category(&category)?;
            println!("{} category #{} {}", "Deactivated".yellow(), id, category);
        }
        CategoryCommand::Delete { id } => report_delete(db.delete_category(id)?, "category", id)?,
    }
    Ok(())
}

fn run_sla(db: &Database, action: SlaCommand) -> CliResult {
    match action {
        SlaCommand::Set {
            priority,
            name,
            response_hours,
            resolution_hours,
            inactive,
        } => {
            let name = name.unwrap_or_else(|| format!("{} priority", priority.label()));
            let config = match db.get_sla_config(priority)? {
                Some(mut existing) => {
                    existing.name = name;
                    existing.response_time_hours = response_hours;
                    existing.resolution_time_hours = resolution_hours;
                    existing.is_active = !inactive;
                    db.save_sla_config(&mut existing)?;
                    println!("{} {}", "Updated".green(), existing);
                    existing
                }
                None => {
                    let created = db.create_sla_config(&NewSlaConfig {
                        name,
                        priority,
                        response_time_hours: response_hours,
                        resolution_time_hours: resolution_hours,
                        is_active: !inactive,
                    })?;
                    println!("{} {}", "Created".green(), created);
                    created
                }
            };
            tracing::debug!(priority = %config.priority, "SLA thresholds stored");
        }
        SlaCommand::List { json } => {
            let configs = db.list_sla_configs()?;
            if json {
                return print_json(&configs);
            }
            if configs.is_empty() {
                println!("No SLA thresholds configured.");
            }
            for SlaConfig {
                name,
                priority,
                response_time_hours,
                resolution_time_hours,
                is_active,
                ..
            } in configs
            {
                let state = if is_active { "" } else { " (inactive)" };
                println!(
                    "{:<8} {:<24} respond {:>4}h  resolve {:>4}h{}",
                    priority, name, response_time_hours, resolution_time_hours, state
                );
            }
        }
    }
    Ok(())
}

// ============================================================================
// Complaints
// ============================================================================

/// Complaint plus the values computed on read
#[derive(Serialize)]
struct ComplaintView<'a> {
    #[serde(flatten)]
    complaint: &'a Complaint,
    is_overdue: bool,
    time_to_resolve_secs: Option<i64>,
    badge_class: &'static str,
}

impl<'a> ComplaintView<'a> {
    fn new(complaint: &'a Complaint, now: DateTime<Utc>) -> Self {
        Self {
            complaint,
            is_overdue: complaint.is_overdue(now),
            time_to_resolve_secs: complaint.time_to_resolve().map(|d| d.num_seconds()),
            badge_class: complaint.badge_class(),
        }
    }
}

#[derive(Serialize)]
struct ComplaintDetail<'a> {
    #[serde(flatten)]
    view: ComplaintView<'a>,
    escalations: &'a [Escalation],
    comments: &'a [Comment],
}

fn run_complaint(db: &Database, config: &Config, action: ComplaintCommand) -> CliResult {
    match action {
        ComplaintCommand::Submit {
            student,
            title,
            description,
            priority,
            category,
            assign,
            deadline,
            sla_hours,
        } => {
            let mut new = NewComplaint::new(student, title, description).priority(priority);
            if let Some(category) = category {
                new = new.category(category);
            }
            if let Some(staff) = assign {
                new = new.assigned_to(staff);
            }
            if let Some(deadline) = deadline {
                new = new.deadline(deadline);
            }
            let sla = sla_hours.map(SlaSettings::with_resolution_hours).unwrap_or(config.sla);

            let complaint = db.create_complaint(new, &sla)?;
            println!("{} complaint {}", "Created".green(), complaint);
            if let Some(deadline) = complaint.sla_deadline() {
                println!("   SLA deadline: {}", fmt_time(deadline));
            }
        }
        ComplaintCommand::List {
            status,
            priority,
            student,
            staff,
            category,
            breached,
            overdue,
            json,
        } => {
            let filter = ComplaintFilter {
                status,
                priority,
                student_id: student,
                assigned_staff_id: staff,
                category_id: category,
                breached_only: breached,
            };
            let now = db.now();
            let complaints: Vec<Complaint> = db
                .list_complaints(&filter)?
                .into_iter()
                .filter(|c| !overdue || c.is_overdue(now))
                .collect();

            if json {
                let views: Vec<ComplaintView> =
                    complaints.iter().map(|c| ComplaintView::new(c, now)).collect();
                return print_json(&views);
            }
            if complaints.is_empty() {
                println!("No complaints.");
            }
            for c in &complaints {
                print_complaint_line(c, now);
            }
        }
        ComplaintCommand::Show { id, json } => {
            let complaint = get_complaint(db, id)?;
            let escalations = db.list_escalations(id)?;
            let comments = db.list_comments(id, true)?;
            let now = db.now();

            if json {
                return print_json(&ComplaintDetail {
                    view: ComplaintView::new(&complaint, now),
                    escalations: &escalations,
                    comments: &comments,
                });
            }
            print_complaint_detail(&complaint, &escalations, &comments, now);
        }
        ComplaintCommand::Assign { id, staff } => {
            let mut complaint = get_complaint(db, id)?;
            complaint.assigned_staff_id = staff;
            if staff.is_some() && complaint.status == Status::Pending {
                complaint.status = Status::InProgress;
            }
            db.save_complaint(&mut complaint)?;
            match staff {
                Some(staff) => println!("{} {} to staff #{}", "Assigned".green(), complaint, staff),
                None => println!("{} assignment on {}", "Cleared".yellow(), complaint),
            }
        }
        ComplaintCommand::Status { id, status, solution } => {
            let mut complaint = get_complaint(db, id)?;
            complaint.status = status;
            if solution.is_some() {
                complaint.solution = solution;
            }
            save_and_report(db, &mut complaint)?;
        }
        ComplaintCommand::Resolve { id, solution } => {
            let mut complaint = get_complaint(db, id)?;
            complaint.status = Status::Resolved;
            complaint.solution = Some(solution);
            save_and_report(db, &mut complaint)?;
        }
        ComplaintCommand::Delete { id } => report_delete(db.delete_complaint(id)?, "complaint", id)?,
        ComplaintCommand::CheckSla => {
            let latched = db.refresh_sla_breaches()?;
            if latched == 0 {
                println!("No new SLA breaches.");
            } else {
                println!("{} {} complaint(s) breached their SLA", "Recorded".red().bold(), latched);
            }
        }
        ComplaintCommand::Stats { json } => {
            let summary = db.complaint_summary()?;
            if json {
                return print_json(&summary);
            }
            println!("{}", "Complaints".bold());
            for entry in &summary.by_status {
                println!("   {:<12} {:>5}", status_colored(entry.status), entry.count);
            }
            println!("   {:<12} {:>5}", "total", summary.total);
            println!("   {:<12} {:>5}", "breached".red(), summary.breached);
            println!("   {:<12} {:>5}", "overdue".yellow(), summary.overdue);
        }
    }
    Ok(())
}

fn get_complaint(db: &Database, id: i32) -> Result<Complaint, DbError> {
    db.get_complaint(id)?
        .ok_or(DbError::NotFound { entity: "complaint", id })
}

fn save_and_report(db: &Database, complaint: &mut Complaint) -> CliResult {
    let effects = db.save_complaint(complaint)?;
    println!("{} {} is now {}", "Updated".green(), complaint, status_colored(complaint.status));
    if effects.resolution_latched {
        if let Some(took) = complaint.time_to_resolve() {
            println!("   Resolved after {}", fmt_duration(took));
        }
    }
    if effects.breach_latched {
        println!("   {}", "SLA deadline has passed".red());
    }
    Ok(())
}

fn print_complaint_line(c: &Complaint, now: DateTime<Utc>) {
    let sla = if c.is_overdue(now) {
        "OVERDUE".red().bold()
    } else if c.is_sla_breached() {
        "breached".red()
    } else {
        "".normal()
    };
    println!(
        "{:>4}  {:<12} {:<7} {}  {}",
        c.id(),
        status_colored(c.status),
        c.priority,
        c.title,
        sla
    );
}

fn print_complaint_detail(c: &Complaint, escalations: &[Escalation], comments: &[Comment], now: DateTime<Utc>) {
    println!("{}", c.to_string().bold());
    println!("   Status:    {}", status_colored(c.status));
    println!("   Priority:  {}", c.priority.label());
    println!("   Student:   #{}", c.student_id);
    match c.assigned_staff_id {
        Some(staff) => println!("   Assigned:  #{}", staff),
        None => println!("   Assigned:  {}", "nobody".dimmed()),
    }
    if let Some(category) = c.category_id {
        println!("   Category:  #{}", category);
    }
    println!("   Created:   {}", fmt_time(c.created_at()));
    println!("   Updated:   {}", fmt_time(c.updated_at()));
    if let Some(deadline) = c.sla_deadline() {
        let marker = if c.is_overdue(now) {
            " OVERDUE".red().bold()
        } else if c.is_sla_breached() {
            " breached".red()
        } else {
            "".normal()
        };
        println!("   Deadline:  {}{}", fmt_time(deadline), marker);
    }
    if let (Some(resolved), Some(took)) = (c.resolved_at(), c.time_to_resolve()) {
        println!("   Resolved:  {} (after {})", fmt_time(resolved), fmt_duration(took));
    }
    println!("\n{}", c.description);
    if let Some(solution) = &c.solution {
        println!("\n{} {}", "Solution:".green().bold(), solution);
    }

    if !escalations.is_empty() {
        println!("\n{}", "Escalations".bold());
        for e in escalations {
            print_escalation_line(e);
        }
    }
    if !comments.is_empty() {
        println!("\n{}", "Comments".bold());
        for comment in comments {
            print_comment_line(comment);
        }
    }
}

// ============================================================================
// Escalations and comments
// ============================================================================

fn run_escalation(db: &Database, action: EscalationCommand) -> CliResult {
    match action {
        EscalationCommand::Create {
            complaint,
            reason,
            by,
            to,
            notes,
        } => {
            let mut new = NewEscalation::new(complaint, reason).notes(notes);
            if let Some(by) = by {
                new = new.by(by);
            }
            if let Some(to) = to {
                new = new.to(to);
            }
            let escalation = db.create_escalation(new)?;
            println!("{} {} ({})", "Created".green(), escalation, escalation.reason.label());
        }
        EscalationCommand::Resolve { id } => {
            let mut escalation = db
                .get_escalation(id)?
                .ok_or(DbError::NotFound { entity: "escalation", id })?;
            escalation.resolved = true;
            if db.save_escalation(&mut escalation)? {
                println!("{} {}", "Resolved".green(), escalation);
            } else {
                println!("{} {} (already resolved)", "Skipping".yellow(), escalation);
            }
        }
        EscalationCommand::List { complaint, json } => {
            let escalations = db.list_escalations(complaint)?;
            if json {
                return print_json(&escalations);
            }
            if escalations.is_empty() {
                println!("No escalations.");
            }
            for e in &escalations {
                print_escalation_line(e);
            }
        }
    }
    Ok(())
}

fn print_escalation_line(e: &Escalation) {
    let state = match e.resolved_at() {
        Some(at) => format!("resolved {}", fmt_time(at)).green(),
        None if e.resolved => "resolved".green(),
        None => "open".yellow(),
    };
    let who = match (e.escalated_by_id, e.escalated_to_id) {
        (Some(by), Some(to)) => format!("#{} -> #{}", by, to),
        (Some(by), None) => format!("by #{}", by),
        (None, Some(to)) => format!("to #{}", to),
        (None, None) => String::new(),
    };
    println!("{:>4}  {:<24} {:<14} {}  {}", e.id(), e.reason.label(), who, state, e.notes.dimmed());
}

fn run_comment(db: &Database, action: CommentCommand) -> CliResult {
    match action {
        CommentCommand::Add {
            complaint,
            content,
            author,
            internal,
        } => {
            if content.trim().is_empty() {
                return Err(CliError::Input("Comment content cannot be empty".to_string()));
            }
            let comment = db.add_comment(&NewComment {
                complaint_id: complaint,
                author_id: author,
                content,
                is_internal: internal,
            })?;
            println!("{} comment #{} on complaint #{}", "Added".green(), comment.id, complaint);
        }
        CommentCommand::List { complaint, public, json } => {
            let comments = db.list_comments(complaint, !public)?;
            if json {
                return print_json(&comments);
            }
            if comments.is_empty() {
                println!("No comments.");
            }
            for comment in &comments {
                print_comment_line(comment);
            }
        }
    }
    Ok(())
}

fn print_comment_line(comment: &Comment) {
    let author = comment
        .author_id
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "(deleted user)".to_string());
    let tag = if comment.is_internal { " [internal]".magenta() } else { "".normal() };
    println!(
        "   {} {}{}: {}",
        fmt_time(comment.created_at).dimmed(),
        author,
        tag,
        comment.content
    );
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_delete(deleted: bool, entity: &'static str, id: i32) -> CliResult {
    if !deleted {
        return Err(DbError::NotFound { entity, id }.into());
    }
    println!("{} {} #{}", "Deleted".red(), entity, id);
    Ok(())
}

/// Same colors as the web badges
fn status_colored(status: Status) -> ColoredString {
    let text = status.to_string();
    match status {
        Status::Pending => text.yellow(),
        Status::InProgress => text.cyan(),
        Status::Resolved => text.green(),
        Status::Escalated => text.red(),
        Status::Closed => text.bright_black(),
    }
}

fn fmt_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn fmt_duration(d: chrono::Duration) -> String {
    let hours = d.num_hours();
    let minutes = d.num_minutes() - hours * 60;
    if hours >= 24 {
        format!("{}d {}h", hours / 24, hours % 24)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}
