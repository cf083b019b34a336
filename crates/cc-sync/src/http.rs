//! Reqwest-backed delivery of queued reports to the complaint API.

use std::time::Duration;

use async_trait::async_trait;
use cc_core::{DeliveryError, DeliveryReceipt, DeliveryRequest};
use reqwest::{Client, Url};

use crate::capabilities::ReportDelivery;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const COMPLAINTS_PATH: &str = "complaints";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = concat!("cc-relay/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpDeliveryConfig {
    pub api_base: Url,
    pub timeout: Duration,
    pub user_agent: String,
}

impl HttpDeliveryConfig {
    pub fn new(api_base: Url) -> Self {
        Self {
            api_base,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub struct HttpDelivery {
    client: Client,
    endpoint: Url,
}

impl HttpDelivery {
    pub fn new(config: HttpDeliveryConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|err| DeliveryError::Build(format!("http client: {err}")))?;
        let endpoint = complaints_endpoint(&config.api_base)?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ReportDelivery for HttpDelivery {
    async fn deliver(
        &self,
        request: &DeliveryRequest,
        token: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .header(IDEMPOTENCY_KEY_HEADER, request.client_reference.as_str())
            .json(request)
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryReceipt {
                status: status.as_u16(),
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => format!("<unreadable response body: {err}>"),
        };
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}

/// `{api_base}/complaints`, keeping any path prefix on the base URL.
fn complaints_endpoint(api_base: &Url) -> Result<Url, DeliveryError> {
    if api_base.cannot_be_a_base() {
        return Err(DeliveryError::Build(format!(
            "api url cannot be used as a base: {api_base}"
        )));
    }
    let mut base = api_base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(COMPLAINTS_PATH)
        .map_err(|err| DeliveryError::Build(format!("complaints endpoint: {err}")))
}
