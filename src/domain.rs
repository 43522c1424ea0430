pub mod models;
pub mod ports;

pub use models::{
    AccountId, CertStatus, CertificateStatus, KeyFingerprint, RevocationParams, RevocationReason,
    RevocationRequest, Serial,
};
pub use ports::{
    AccountDirectory, CertificateStatusStore, DistributedCache, IncidentStreamSource,
    KeyFingerprintIndex, OcspSigner, RevocationOutcome, Revoker, SerialStream,
};
