use std::fmt;

use chrono::{DateTime, Utc};
use der::Decode;
use der::asn1::{GeneralizedTime, ObjectIdentifier};

use crate::domain::Serial;
use crate::ocsp::asn1::{
    BasicOcspResponse, ID_PKIX_OCSP_BASIC, ID_SHA1, ID_SHA256, OcspResponse, OcspResponseStatus,
};
use crate::ocsp::errors::{OcspError, OcspResult};

/// Hash algorithms accepted in a CertID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    fn from_oid(oid: &ObjectIdentifier) -> OcspResult<Self> {
        if *oid == ID_SHA1 {
            Ok(Self::Sha1)
        } else if *oid == ID_SHA256 {
            Ok(Self::Sha256)
        } else {
            Err(OcspError::UnsupportedHashAlgorithm(oid.to_string()))
        }
    }

    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Self::Sha1 => ID_SHA1,
            Self::Sha256 => ID_SHA256,
        }
    }
}

/// The issuer a response speaks for, as named by its CertID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssuerIdentity {
    pub algorithm: HashAlgorithm,
    pub key_hash: Vec<u8>,
}

impl fmt::Display for IssuerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.algorithm, hex::encode(&self.key_hash))
    }
}

/// The fields of a single-certificate OCSP response the cache writer needs.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub serial: Serial,
    pub issuer: IssuerIdentity,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

impl ParsedResponse {
    /// Parses a DER `OCSPResponse`. Signatures are not checked.
    pub fn from_der(der: &[u8]) -> OcspResult<Self> {
        let response = OcspResponse::from_der(der)?;
        if response.response_status != OcspResponseStatus::Successful {
            return Err(OcspError::Unsuccessful(response.response_status));
        }
        let bytes = response
            .response_bytes
            .ok_or(OcspError::MissingResponseBytes)?;
        if bytes.response_type != ID_PKIX_OCSP_BASIC {
            return Err(OcspError::UnsupportedResponseType(
                bytes.response_type.to_string(),
            ));
        }

        let basic = BasicOcspResponse::from_der(bytes.response.as_bytes())?;
        let mut responses = basic.tbs_response_data.responses;
        if responses.len() != 1 {
            return Err(OcspError::ResponseCount(responses.len()));
        }
        let single = responses.remove(0);

        let issuer = IssuerIdentity {
            algorithm: HashAlgorithm::from_oid(&single.cert_id.hash_algorithm.oid)?,
            key_hash: single.cert_id.issuer_key_hash.as_bytes().to_vec(),
        };
        let next_update = single.next_update.map(to_utc).transpose()?;

        Ok(Self {
            serial: Serial::from_bytes(single.cert_id.serial_number.as_bytes()),
            issuer,
            this_update: to_utc(single.this_update)?,
            next_update,
        })
    }
}

fn to_utc(time: GeneralizedTime) -> OcspResult<DateTime<Utc>> {
    let since_epoch = time.to_unix_duration();
    let secs = i64::try_from(since_epoch.as_secs()).map_err(|_| OcspError::InvalidTime)?;
    DateTime::from_timestamp(secs, since_epoch.subsec_nanos()).ok_or(OcspError::InvalidTime)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use der::Encode;

    use super::*;
    use crate::cert_utils::{ResponseTemplate, build_response};

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_parse_response() {
        let template = ResponseTemplate::new(vec![0xaa; 20], &[0x05, 0x39], now())
            .next_update(now() + chrono::Duration::hours(1));
        let parsed = ParsedResponse::from_der(&build_response(&template).unwrap()).unwrap();

        assert_eq!(parsed.serial.as_str(), "000000000000000000000000000000000539");
        assert_eq!(parsed.issuer.algorithm, HashAlgorithm::Sha1);
        assert_eq!(parsed.issuer.key_hash, vec![0xaa; 20]);
        assert_eq!(parsed.this_update, now());
        assert_eq!(parsed.next_update, Some(now() + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_parse_response_without_next_update() {
        let template = ResponseTemplate::new(vec![0xbb; 32], &[0x01], now()).sha256();
        let parsed = ParsedResponse::from_der(&build_response(&template).unwrap()).unwrap();
        assert_eq!(parsed.issuer.algorithm, HashAlgorithm::Sha256);
        assert_eq!(parsed.next_update, None);
    }

    #[test]
    fn test_unsuccessful_status() {
        let der = OcspResponse {
            response_status: OcspResponseStatus::TryLater,
            response_bytes: None,
        }
        .to_der()
        .unwrap();
        assert!(matches!(
            ParsedResponse::from_der(&der),
            Err(OcspError::Unsuccessful(OcspResponseStatus::TryLater))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            ParsedResponse::from_der(b"\x30\x03garbage"),
            Err(OcspError::Malformed(_))
        ));
    }

    #[test]
    fn test_multiple_single_responses_are_rejected() {
        let template = ResponseTemplate::new(vec![0xaa; 20], &[0x01], now()).repeat(2);
        assert!(matches!(
            ParsedResponse::from_der(&build_response(&template).unwrap()),
            Err(OcspError::ResponseCount(2))
        ));
    }
}
