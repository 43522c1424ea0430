//! HTTP client for the remote certificate authority.
//!
//! Revocations and OCSP generation are owned by the authority; this client
//! only relays requests and classifies the replies.

mod errors;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Report;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use errors::{AuthorityError, AuthorityResult};

use crate::config::AuthorityConfig;
use crate::domain::{
    CertStatus, CertificateStatus, OcspSigner, RevocationOutcome, RevocationRequest, Revoker,
    Serial,
};

const REVOKE_PATH: &str = "admin/revoke-certificate";
const GENERATE_OCSP_PATH: &str = "ocsp/generate";
const ALREADY_REVOKED: &str = "alreadyRevoked";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RevokeCertificateBody<'a> {
    serial: &'a Serial,
    code: i64,
    admin_name: &'a str,
    skip_block_key: bool,
    malformed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateOcspBody<'a> {
    serial: &'a Serial,
    status: CertStatus,
    reason: Option<i64>,
    revoked_at: Option<DateTime<Utc>>,
}

/// RFC 7807 problem document returned on errors.
#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    detail: String,
}

impl Problem {
    fn is_already_revoked(&self) -> bool {
        self.kind == ALREADY_REVOKED || self.kind.ends_with(&format!(":{ALREADY_REVOKED}"))
    }
}

#[derive(Debug, Clone)]
pub struct AuthorityClient {
    client: Client,
    base_url: Url,
    admin_name: String,
}

impl AuthorityClient {
    pub fn new(config: &AuthorityConfig) -> AuthorityResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        // A trailing slash keeps `join` from replacing the last path segment.
        let base_url = if config.url.ends_with('/') {
            Url::parse(&config.url)?
        } else {
            Url::parse(&format!("{}/", config.url))?
        };
        Ok(Self {
            client,
            base_url,
            admin_name: config.admin_name.clone(),
        })
    }

    /// Asks the authority to revoke a single certificate.
    pub async fn revoke_certificate(&self, request: &RevocationRequest) -> AuthorityResult<()> {
        let body = RevokeCertificateBody {
            serial: &request.serial,
            code: request.reason.code(),
            admin_name: &self.admin_name,
            skip_block_key: request.skip_block_key,
            malformed: request.malformed,
        };
        let response = self
            .client
            .post(self.base_url.join(REVOKE_PATH)?)
            .json(&body)
            .send()
            .await?;
        if response.status().is_success() {
            debug!(serial = %request.serial, "authority accepted revocation");
            return Ok(());
        }

        let status = response.status();
        let problem = read_problem(response).await;
        if status == StatusCode::CONFLICT && problem.is_already_revoked() {
            return Err(AuthorityError::AlreadyRevoked(problem.detail));
        }
        Err(AuthorityError::Status {
            status,
            detail: problem.detail,
        })
    }

    /// Asks the authority to sign an OCSP response for `status`.
    pub async fn generate_ocsp(&self, status: &CertificateStatus) -> AuthorityResult<Vec<u8>> {
        let body = GenerateOcspBody {
            serial: &status.serial,
            status: status.status,
            reason: status.revoked_reason.map(|reason| reason.code()),
            revoked_at: status.revoked_date,
        };
        let response = self
            .client
            .post(self.base_url.join(GENERATE_OCSP_PATH)?)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let problem = read_problem(response).await;
            return Err(AuthorityError::Status {
                status,
                detail: problem.detail,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

async fn read_problem(response: Response) -> Problem {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str(&body).unwrap_or(Problem {
        kind: String::new(),
        detail: body,
    })
}

#[async_trait]
impl Revoker for AuthorityClient {
    async fn revoke(&self, request: &RevocationRequest) -> RevocationOutcome {
        match self.revoke_certificate(request).await {
            Ok(()) => RevocationOutcome::Succeeded,
            Err(AuthorityError::AlreadyRevoked(_)) => RevocationOutcome::AlreadyRevoked,
            Err(e) => RevocationOutcome::Failed(e.into()),
        }
    }
}

#[async_trait]
impl OcspSigner for AuthorityClient {
    async fn sign(&self, status: &CertificateStatus) -> color_eyre::Result<Vec<u8>> {
        self.generate_ocsp(status)
            .await
            .map_err(|e| {
                Report::new(e).wrap_err(format!("generating OCSP response for {}", status.serial))
            })
    }
}
