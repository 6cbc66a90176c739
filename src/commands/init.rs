// ABOUTME: Init command implementation.
// ABOUTME: Writes a starter deckhand.yml into the current directory.

use deckhand::config::{CONFIG_FILENAME, init_config};
use deckhand::error::{ExitStatus, Result};
use deckhand::output::Output;
use std::env;

pub fn init(project: Option<&str>, force: bool, output: &Output) -> Result<ExitStatus> {
    let cwd = env::current_dir()?;
    init_config(&cwd, project, force)?;
    output.success(&format!("Created {CONFIG_FILENAME}"));
    Ok(ExitStatus::Success)
}
