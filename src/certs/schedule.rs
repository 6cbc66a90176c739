// ABOUTME: Crontab entry for the recurring certificate reconcile.
// ABOUTME: A per-project marker keeps the entry unique across re-installs.

use std::path::Path;

use crate::types::ComponentName;

/// Trailing comment identifying the renewal entry for `project`.
pub fn schedule_marker(project: &ComponentName) -> String {
    format!("# deckhand-renew[{project}]")
}

pub fn renewal_schedule_entry(schedule: &str, command: &str, log: &Path, marker: &str) -> String {
    format!("{schedule} {command} >> {} 2>&1 {marker}", log.display())
}

/// Five whitespace-separated cron fields.
pub fn is_valid_schedule(schedule: &str) -> bool {
    schedule.split_whitespace().count() == 5
}
