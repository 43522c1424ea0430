#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use ca_ops::{
    cert_utils::generate_issuer_certificate,
    config::IssuerConfig,
    domain::{RevocationOutcome, RevocationRequest, Revoker, Serial},
    ocsp::IssuerRegistry,
};
use color_eyre::eyre::eyre;
use tempfile::NamedTempFile;

/// A revoker that records every request and answers from fixed lists.
#[derive(Default)]
pub struct RecordingRevoker {
    requests: Mutex<Vec<RevocationRequest>>,
    doomed_to_fail: HashSet<Serial>,
    already_revoked: HashSet<Serial>,
}

impl RecordingRevoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doomed_to_fail(mut self, serial: &str) -> Self {
        self.doomed_to_fail.insert(Serial::new(serial));
        self
    }

    pub fn already_revoked(mut self, serial: &str) -> Self {
        self.already_revoked.insert(Serial::new(serial));
        self
    }

    pub fn requests(&self) -> Vec<RevocationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn revoked_serials(&self) -> Vec<Serial> {
        let mut serials: Vec<Serial> = self.requests().into_iter().map(|r| r.serial).collect();
        serials.sort();
        serials
    }
}

#[async_trait]
impl Revoker for RecordingRevoker {
    async fn revoke(&self, request: &RevocationRequest) -> RevocationOutcome {
        self.requests.lock().unwrap().push(request.clone());
        if self.doomed_to_fail.contains(&request.serial) {
            return RevocationOutcome::Failed(eyre!("authority unavailable"));
        }
        if self.already_revoked.contains(&request.serial) {
            return RevocationOutcome::AlreadyRevoked;
        }
        RevocationOutcome::Succeeded
    }
}

pub fn serials(values: &[&str]) -> Vec<Serial> {
    values.iter().map(|v| Serial::new(*v)).collect()
}

/// A freshly generated issuer, written to disk and loaded into a registry.
pub struct TestIssuer {
    pub registry: IssuerRegistry,
    pub sha1_key_hash: Vec<u8>,
    pub sha256_key_hash: Vec<u8>,
    _cert_file: NamedTempFile,
}

pub fn test_issuer(short_id: u32) -> TestIssuer {
    let (cert, _key) = generate_issuer_certificate("int-e1").unwrap();
    let mut cert_file = NamedTempFile::new().unwrap();
    cert_file.write_all(&cert.to_pem().unwrap()).unwrap();

    let registry = IssuerRegistry::load(&[IssuerConfig {
        cert_file: cert_file.path().to_path_buf(),
        short_id,
    }])
    .unwrap();
    let issuer = registry.issuers()[0].clone();

    TestIssuer {
        registry,
        sha1_key_hash: issuer.sha1_key_hash,
        sha256_key_hash: issuer.sha256_key_hash,
        _cert_file: cert_file,
    }
}
