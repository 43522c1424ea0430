use std::collections::HashMap;
use std::path::Path;

use ring::digest::{SHA1_FOR_LEGACY_USE_ONLY, SHA256, digest};
use tracing::info;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::config::IssuerConfig;
use crate::ocsp::errors::{OcspError, OcspResult};
use crate::ocsp::response::{HashAlgorithm, IssuerIdentity};

/// A trusted issuer and its out-of-band short id.
#[derive(Debug, Clone)]
pub struct Issuer {
    pub short_id: u32,
    pub subject: String,
    pub sha1_key_hash: Vec<u8>,
    pub sha256_key_hash: Vec<u8>,
}

impl Issuer {
    /// Parses a PEM (or DER) issuer certificate.
    pub fn from_certificate(cert_bytes: &[u8], short_id: u32) -> Result<Self, String> {
        let der = match pem::parse(cert_bytes) {
            Ok(parsed_pem) => parsed_pem.into_contents(),
            Err(_) => cert_bytes.to_vec(),
        };
        let (_, cert) = X509Certificate::from_der(&der).map_err(|e| e.to_string())?;

        // CertID key hashes cover the BIT STRING value of the subject public key.
        let public_key = &*cert.public_key().subject_public_key.data;
        Ok(Self {
            short_id,
            subject: cert.subject().to_string(),
            sha1_key_hash: digest(&SHA1_FOR_LEGACY_USE_ONLY, public_key).as_ref().to_vec(),
            sha256_key_hash: digest(&SHA256, public_key).as_ref().to_vec(),
        })
    }

    pub fn key_hash(&self, algorithm: HashAlgorithm) -> &[u8] {
        match algorithm {
            HashAlgorithm::Sha1 => &self.sha1_key_hash,
            HashAlgorithm::Sha256 => &self.sha256_key_hash,
        }
    }
}

/// Issuers preloaded at startup, keyed by their CertID identity.
#[derive(Debug, Clone, Default)]
pub struct IssuerRegistry {
    issuers: Vec<Issuer>,
    by_identity: HashMap<IssuerIdentity, u32>,
}

impl IssuerRegistry {
    pub fn new(issuers: Vec<Issuer>) -> OcspResult<Self> {
        let mut by_identity = HashMap::new();
        let mut seen = HashMap::new();
        for issuer in &issuers {
            if seen.insert(issuer.short_id, ()).is_some() {
                return Err(OcspError::DuplicateShortId(issuer.short_id));
            }
            for algorithm in [HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
                by_identity.insert(
                    IssuerIdentity {
                        algorithm,
                        key_hash: issuer.key_hash(algorithm).to_vec(),
                    },
                    issuer.short_id,
                );
            }
        }
        Ok(Self {
            issuers,
            by_identity,
        })
    }

    /// Loads every configured issuer certificate from disk.
    pub fn load(configs: &[IssuerConfig]) -> OcspResult<Self> {
        let mut issuers = Vec::with_capacity(configs.len());
        for config in configs {
            issuers.push(load_issuer(&config.cert_file, config.short_id)?);
        }
        let registry = Self::new(issuers)?;
        info!("Loaded {} issuers", registry.issuers.len());
        Ok(registry)
    }

    pub fn issuers(&self) -> &[Issuer] {
        &self.issuers
    }

    pub fn short_id_for(&self, identity: &IssuerIdentity) -> OcspResult<u32> {
        self.by_identity
            .get(identity)
            .copied()
            .ok_or_else(|| OcspError::UnknownIssuer(identity.to_string()))
    }
}

fn load_issuer(path: &Path, short_id: u32) -> OcspResult<Issuer> {
    let bytes = std::fs::read(path).map_err(|e| OcspError::IssuerLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Issuer::from_certificate(&bytes, short_id).map_err(|reason| OcspError::IssuerLoad {
        path: path.to_path_buf(),
        reason,
    })
}
