// ABOUTME: Certificate lifecycle: observe expiry, decide, and issue or renew.
// ABOUTME: Also builds the crontab entry for the recurring renewal run.

mod manager;
mod policy;
mod schedule;

pub use manager::{CertAction, CertificateManager};
pub use policy::{CertDecision, CertificateState, decide};
pub use schedule::{is_valid_schedule, renewal_schedule_entry, schedule_marker};
