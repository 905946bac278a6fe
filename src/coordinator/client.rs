use std::time::Duration;

use crate::coordinator::{TransformCoordinator, TransformState};
use crate::foundation::error::{ReelError, ReelResult};

/// Per-request timeout used by workers; a slow coordinator must not stall a frame for long.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Talks to a coordinator service over HTTP (`GET /`, `POST /`).
#[derive(Clone, Debug)]
pub struct HttpCoordinator {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpCoordinator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ReelResult<Self> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(ReelError::validation("coordinator url must not be empty"));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReelError::coordinator(format!("failed to build http client: {e}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl TransformCoordinator for HttpCoordinator {
    fn fetch(&self) -> ReelResult<TransformState> {
        self.client
            .get(&self.base_url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<TransformState>())
            .map_err(|e| ReelError::coordinator(format!("GET {} failed: {e}", self.base_url)))
    }

    fn propose(&self, candidate: TransformState) -> ReelResult<TransformState> {
        self.client
            .post(&self.base_url)
            .json(&candidate)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<TransformState>())
            .map_err(|e| ReelError::coordinator(format!("POST {} failed: {e}", self.base_url)))
    }
}
