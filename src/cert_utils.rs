//! Helpers for generating issuer certificates and unsigned OCSP responses in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use der::asn1::{Any, BitString, GeneralizedTime, OctetString};
use der::{Encode, Tag, TagNumber};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::ocsp::asn1::{
    BasicOcspResponse, CertId, ID_PKIX_OCSP_BASIC, OcspResponse, OcspResponseStatus,
    ResponseBytes, ResponseData, SingleResponse,
};
use crate::ocsp::HashAlgorithm;

/// ecdsa-with-SHA256, used as a placeholder signature algorithm.
const ECDSA_WITH_SHA256: der::asn1::ObjectIdentifier =
    der::asn1::ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// Generates a self-signed P-256 issuer certificate with the given common name.
pub fn generate_issuer_certificate(common_name: &str) -> Result<(X509, PKey<Private>), ErrorStack> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    let key_pair = PKey::from_ec_key(EcKey::generate(&group)?)?;

    let mut cert_builder = X509Builder::new()?;
    cert_builder.set_version(2)?;
    let serial_number = generate_serial_number()?;
    cert_builder.set_serial_number(&serial_number)?;

    let subject_name = create_x509_name(&[("O", "Test CA"), ("CN", common_name)])?;
    cert_builder.set_subject_name(&subject_name)?;
    cert_builder.set_issuer_name(&subject_name)?;
    cert_builder.set_pubkey(&key_pair)?;

    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(365)?;
    cert_builder.set_not_before(&not_before)?;
    cert_builder.set_not_after(&not_after)?;

    cert_builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    cert_builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build()?)?;
    cert_builder.sign(&key_pair, MessageDigest::sha256())?;

    Ok((cert_builder.build(), key_pair))
}

fn generate_serial_number() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn create_x509_name(entries: &[(&str, &str)]) -> Result<X509Name, ErrorStack> {
    let mut name_builder = X509NameBuilder::new()?;
    for (key, value) in entries {
        name_builder.append_entry_by_text(key, value)?;
    }
    Ok(name_builder.build())
}

/// Shape of a synthetic OCSP response.
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    pub issuer_key_hash: Vec<u8>,
    pub algorithm: HashAlgorithm,
    pub serial: Vec<u8>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub count: usize,
}

impl ResponseTemplate {
    pub fn new(issuer_key_hash: Vec<u8>, serial: &[u8], this_update: DateTime<Utc>) -> Self {
        Self {
            issuer_key_hash,
            algorithm: HashAlgorithm::Sha1,
            serial: serial.to_vec(),
            this_update,
            next_update: None,
            count: 1,
        }
    }

    pub fn next_update(mut self, next_update: DateTime<Utc>) -> Self {
        self.next_update = Some(next_update);
        self
    }

    pub fn sha256(mut self) -> Self {
        self.algorithm = HashAlgorithm::Sha256;
        self
    }

    /// Repeats the single response `count` times.
    pub fn repeat(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

fn generalized_time(time: DateTime<Utc>) -> der::Result<GeneralizedTime> {
    let secs = u64::try_from(time.timestamp()).map_err(|_| Tag::GeneralizedTime.value_error())?;
    GeneralizedTime::from_unix_duration(Duration::from_secs(secs))
}

/// Builds a DER `OCSPResponse` with a "good" status and a dummy signature.
pub fn build_response(template: &ResponseTemplate) -> der::Result<Vec<u8>> {
    let single = SingleResponse {
        cert_id: CertId {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: template.algorithm.oid(),
                parameters: None,
            },
            issuer_name_hash: OctetString::new(vec![0u8; template.issuer_key_hash.len()])?,
            issuer_key_hash: OctetString::new(template.issuer_key_hash.clone())?,
            serial_number: SerialNumber::new(&template.serial)?,
        },
        // good: [0] IMPLICIT NULL
        cert_status: Any::new(
            Tag::ContextSpecific {
                constructed: false,
                number: TagNumber::N0,
            },
            Vec::new(),
        )?,
        this_update: generalized_time(template.this_update)?,
        next_update: template.next_update.map(generalized_time).transpose()?,
        single_extensions: None,
    };

    let responder_key_hash = OctetString::new(template.issuer_key_hash.clone())?;
    let basic = BasicOcspResponse {
        tbs_response_data: ResponseData {
            version: None,
            // byKey: [2] EXPLICIT KeyHash
            responder_id: Any::new(
                Tag::ContextSpecific {
                    constructed: true,
                    number: TagNumber::N2,
                },
                responder_key_hash.to_der()?,
            )?,
            produced_at: generalized_time(template.this_update)?,
            responses: vec![single; template.count],
            response_extensions: None,
        },
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA256,
            parameters: None,
        },
        signature: BitString::from_bytes(&[0u8; 64])?,
        certs: None,
    };

    OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: ID_PKIX_OCSP_BASIC,
            response: OctetString::new(basic.to_der()?)?,
        }),
    }
    .to_der()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_issuer_certificate() {
        let (cert, key) = generate_issuer_certificate("Test Issuer").unwrap();
        assert!(X509::from_pem(&cert.to_pem().unwrap()).is_ok());
        assert!(cert.public_key().unwrap().public_eq(&key));
    }
}
