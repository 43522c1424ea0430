use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{RevocationOutcome, RevocationRequest, Revoker};
use crate::revocation::audit::AuditLog;

/// A revoker that only reports what it would have sent.
pub struct DryRunRevoker {
    log: Arc<dyn AuditLog>,
}

impl DryRunRevoker {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Revoker for DryRunRevoker {
    async fn revoke(&self, request: &RevocationRequest) -> RevocationOutcome {
        self.log.info(format!(
            "dry-run: revoke serial={} reason={} skip_block_key={} malformed={}",
            request.serial, request.reason, request.skip_block_key, request.malformed
        ));
        RevocationOutcome::Succeeded
    }
}
