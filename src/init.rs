//! Workspace initialization for complaintdesk
//!
//! `complaintdesk init` creates `.complaintdesk/` with a config file and an
//! empty database, and keeps the database out of git.

use crate::config::{Config, SlaSettings, WORKSPACE_DIR};
use crate::db::{Database, DB_FILE_NAME};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Initialize complaintdesk in `dir`. Returns the database path.
pub fn init_project(dir: &Path, sla: SlaSettings) -> Result<PathBuf, String> {
    println!("\n{}", "Initializing complaintdesk...".cyan().bold());
    println!("   Directory: {}\n", dir.display());

    // 1. Create .complaintdesk directory
    let workspace = dir.join(WORKSPACE_DIR);
    create_dir_if_missing(&workspace)?;

    // 2. Write config.toml unless one is already there
    let config_path = workspace.join("config.toml");
    if config_path.exists() {
        println!("   {} {}/config.toml (already exists)", "Skipping".yellow(), WORKSPACE_DIR);
    } else {
        let config = Config {
            sla,
            ..Config::default()
        };
        config
            .write_to_dir(&workspace)
            .map_err(|e| format!("Could not write config: {}", e))?;
        println!("   {} {}/config.toml", "Creating".green(), WORKSPACE_DIR);
    }

    // 3. Initialize database by opening it (creates tables)
    let db_path = workspace.join(DB_FILE_NAME);
    Database::open_at(&db_path).map_err(|e| format!("Could not create database: {}", e))?;
    println!("   {} {}/{}", "Ready".green(), WORKSPACE_DIR, DB_FILE_NAME);

    // 4. Add .complaintdesk to .gitignore if not already there
    add_to_gitignore(dir)?;

    println!("\n{}", "complaintdesk initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Add people with {}", "complaintdesk user add <name> --role student".cyan());
    println!("  2. File a complaint with {}", "complaintdesk complaint submit".cyan());
    println!("  3. Sweep for late complaints with {}", "complaintdesk complaint check-sla".cyan());
    println!();

    Ok(db_path)
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
        println!("   {} {}", "Creating".green(), path.display());
    }
    Ok(())
}

fn add_to_gitignore(dir: &Path) -> Result<(), String> {
    let gitignore_path = dir.join(".gitignore");
    let entry = format!("{}/", WORKSPACE_DIR);

    if gitignore_path.exists() {
        let existing = fs::read_to_string(&gitignore_path)
            .map_err(|e| format!("Could not read .gitignore: {}", e))?;

        if existing
            .lines()
            .any(|line| line.trim() == entry || line.trim() == WORKSPACE_DIR)
        {
            return Ok(());
        }

        let new_content = format!(
            "{}\n\n# complaintdesk database (local)\n{}\n",
            existing.trim_end(),
            entry
        );
        fs::write(&gitignore_path, new_content)
            .map_err(|e| format!("Could not update .gitignore: {}", e))?;
        println!("   {} .gitignore (added {})", "Updated".green(), entry);
    } else {
        let content = format!("# complaintdesk database (local)\n{}\n", entry);
        fs::write(&gitignore_path, content)
            .map_err(|e| format!("Could not create .gitignore: {}", e))?;
        println!("   {} .gitignore", "Creating".green());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_workspace() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = init_project(dir.path(), SlaSettings::with_resolution_hours(24)).unwrap();

        assert!(db_path.exists());
        let config = Config::load_from(&dir.path().join(WORKSPACE_DIR).join("config.toml")).unwrap();
        assert_eq!(config.sla.resolution_time_hours, 24);
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".complaintdesk/"));
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();

        init_project(dir.path(), SlaSettings::default()).unwrap();
        init_project(dir.path(), SlaSettings::with_resolution_hours(1)).unwrap();

        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".complaintdesk/").count(), 1);
        assert!(gitignore.starts_with("target/"));
        // Existing config is not overwritten
        let config = Config::load_from(&dir.path().join(WORKSPACE_DIR).join("config.toml")).unwrap();
        assert_eq!(config.sla.resolution_time_hours, 72);
    }
}
