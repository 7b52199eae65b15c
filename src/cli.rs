//! The thin flag surface pinned in spec §6 — this crate's own binary
//! entry point, not the richer interactive tool the spec's scope section
//! lists as an out-of-scope collaborator.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Natural-language scheduling request, e.g. "Call mom tomorrow at 2pm for 30 minutes".
    #[arg(required = false)]
    pub query: Option<String>,

    /// Read the query from stdin, one line at a time.
    #[arg(long)]
    pub interactive: bool,

    /// IANA timezone to interpret the query in.
    #[arg(long, default_value = "America/New_York")]
    pub timezone: String,

    /// Path to the SQLite database file.
    #[arg(long)]
    pub db_path: Option<String>,

    /// Emit the final trace as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// List all persisted tasks.
    #[arg(long)]
    pub list: bool,

    /// Delete a task (and, if it is a parent, all of its children) by id.
    #[arg(long)]
    pub delete: Option<String>,

    /// Delete only the children of a parent task, by the parent's id.
    #[arg(long)]
    pub delete_parent: Option<String>,

    /// Delete every persisted task. Requires typing "yes" when prompted.
    #[arg(long)]
    pub delete_all: bool,
}
