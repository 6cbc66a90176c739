// ABOUTME: Run orchestration: state machine, run lock, health and disk guards, rollback.
// ABOUTME: The orchestrator drives any plan; the rollback controller restores earlier revisions.

mod abort;
mod disk;
mod error;
mod health;
mod history;
mod lock;
mod orchestrator;
mod rollback;
mod state;

pub use abort::AbortHandle;
pub use disk::{CleanupPass, DiskGuard, DiskReport};
pub use error::{DeployError, DeployErrorKind};
pub use health::wait_for_containers;
pub use history::{ComponentHistory, RevisionHistory};
pub use lock::{LockInfo, RunLock};
pub use orchestrator::{DISK_CLEANUP_STEP, Orchestrator};
pub use rollback::{
    AssumeYes, Confirm, ResolvedTarget, RollbackController, RollbackMode, RollbackPlan,
    RollbackTarget, TerminalPrompt,
};
pub use state::RunState;
