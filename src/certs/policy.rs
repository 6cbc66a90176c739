// ABOUTME: Pure renewal policy over an observed certificate state.
// ABOUTME: Absent means issue; within the renewal window means renew.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// What the certificate store holds for one domain, observed fresh each run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateState {
    pub domain: String,
    pub not_after: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

impl CertificateState {
    /// Validity left at `now`; zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.not_after
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertDecision {
    Issue,
    Renew,
    NoneNeeded,
}

pub fn decide(state: &CertificateState, now: DateTime<Utc>, renew_before: Duration) -> CertDecision {
    match state.remaining(now) {
        None => CertDecision::Issue,
        Some(left) if left <= renew_before => CertDecision::Renew,
        Some(_) => CertDecision::NoneNeeded,
    }
}
