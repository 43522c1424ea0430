mod audit;
mod dry_run;
mod errors;
mod orchestrator;

pub use audit::{AuditLevel, AuditLog, MemoryAuditLog, TracingAuditLog};
pub use dry_run::DryRunRevoker;
pub use errors::{RevocationError, RevocationResult};
pub use orchestrator::{RevocationOrchestrator, RevocationSummary};
