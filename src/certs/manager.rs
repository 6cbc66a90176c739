// ABOUTME: Certificate reconcile against the certificate authority and reverse proxy.
// ABOUTME: Issuance frees the proxy port and always restarts the proxy afterwards.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::TlsConfig;
use crate::diagnostics::{Diagnostics, Warning};
use crate::plan::CertTarget;
use crate::tools::{CertificateAuthority, ReverseProxy, ToolError};

use super::policy::{CertDecision, CertificateState, decide};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertAction {
    NoneNeeded,
    Issued,
    Renewed,
    Failed(String),
}

impl fmt::Display for CertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertAction::NoneNeeded => write!(f, "certificate is current"),
            CertAction::Issued => write!(f, "certificate issued"),
            CertAction::Renewed => write!(f, "certificate renewed"),
            CertAction::Failed(reason) => write!(f, "certificate reconcile failed: {reason}"),
        }
    }
}

pub struct CertificateManager {
    authority: Arc<dyn CertificateAuthority>,
    proxy: Arc<dyn ReverseProxy>,
    renew_before: Duration,
    issuance_timeout: Duration,
}

impl CertificateManager {
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        proxy: Arc<dyn ReverseProxy>,
        tls: &TlsConfig,
    ) -> Self {
        Self {
            authority,
            proxy,
            renew_before: tls.renew_before,
            issuance_timeout: tls.issuance_timeout,
        }
    }

    /// Read the current certificate state from the store; never cached.
    pub async fn observe(&self, domain: &str) -> Result<CertificateState, ToolError> {
        let not_after = self.authority.current_expiry(domain).await?;
        Ok(CertificateState {
            domain: domain.to_string(),
            not_after,
            path: self.authority.certificate_path(domain),
        })
    }

    pub async fn reconcile(&self, target: &CertTarget, diag: &mut Diagnostics) -> CertAction {
        self.reconcile_at(target, Utc::now(), diag).await
    }

    pub async fn reconcile_at(
        &self,
        target: &CertTarget,
        now: DateTime<Utc>,
        diag: &mut Diagnostics,
    ) -> CertAction {
        let state = match self.observe(&target.domain).await {
            Ok(state) => state,
            Err(e) => return CertAction::Failed(format!("could not read certificate: {e}")),
        };

        let decision = decide(&state, now, self.renew_before);
        debug!(domain = %target.domain, ?decision, not_after = ?state.not_after, "certificate decision");

        match decision {
            CertDecision::NoneNeeded => CertAction::NoneNeeded,
            CertDecision::Issue => self.issue(target, diag).await,
            CertDecision::Renew => self.renew(&state, diag).await,
        }
    }

    async fn issue(&self, target: &CertTarget, diag: &mut Diagnostics) -> CertAction {
        info!(domain = %target.domain, "issuing certificate");

        if let Err(e) = self.proxy.stop().await {
            warn!("could not stop proxy before issuance: {e}");
        }

        let obtained = self
            .bounded(self.authority.obtain(&target.domain, &target.email))
            .await;

        // the proxy comes back whatever happened above
        let restarted = self.proxy.start().await;

        if let Err(reason) = obtained {
            if let Err(e) = restarted {
                diag.warn(Warning::proxy_restart(format!(
                    "proxy did not restart after failed issuance: {e}"
                )));
            }
            return CertAction::Failed(reason);
        }

        if let Err(e) = restarted {
            diag.warn(Warning::proxy_restart(format!(
                "certificate issued but proxy did not restart: {e}"
            )));
        }

        match self.authority.current_expiry(&target.domain).await {
            Ok(Some(_)) => CertAction::Issued,
            Ok(None) => CertAction::Failed(format!(
                "no certificate found for {} after issuance",
                target.domain
            )),
            Err(e) => CertAction::Failed(format!("could not verify issued certificate: {e}")),
        }
    }

    async fn renew(&self, state: &CertificateState, diag: &mut Diagnostics) -> CertAction {
        info!(domain = %state.domain, not_after = ?state.not_after, "renewing certificate");

        if let Err(reason) = self.bounded(self.authority.renew(&state.domain)).await {
            return CertAction::Failed(reason);
        }

        match self.authority.current_expiry(&state.domain).await {
            Ok(Some(after)) if state.not_after.is_none_or(|before| after > before) => {}
            Ok(_) => {
                return CertAction::Failed(format!(
                    "expiry of {} unchanged after renewal",
                    state.domain
                ));
            }
            Err(e) => return CertAction::Failed(format!("could not verify renewal: {e}")),
        }

        if let Err(e) = self.proxy.reload().await {
            diag.warn(Warning::proxy_restart(format!(
                "certificate renewed but proxy reload failed: {e}"
            )));
        }

        CertAction::Renewed
    }

    /// Apply the overall issuance ceiling to an authority call.
    async fn bounded<F>(&self, call: F) -> Result<(), String>
    where
        F: Future<Output = Result<(), ToolError>>,
    {
        match tokio::time::timeout(self.issuance_timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "certificate authority did not finish within {}s",
                self.issuance_timeout.as_secs()
            )),
        }
    }
}
