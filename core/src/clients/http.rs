//! Shared JSON-over-HTTP plumbing for the remote collaborators.
//!
//! Every service answers with the same envelope:
//!
//! ```text
//! { "status": "success", "data": { ... } }
//! { "status": "error", "message": "...", "code": "..." }
//! ```

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

use super::ClientError;

/// API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
        code: Option<String>,
    },
}

impl<T> ApiResponse<T> {
    pub fn into_result(self, service: &'static str) -> Result<T, ClientError> {
        match self {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { message, code } => Err(ClientError::rejected(
                service,
                format!("({}) {}", code.unwrap_or_else(|| "unknown".to_string()), message),
            )),
        }
    }
}

/// A base URL plus a configured reqwest client.
#[derive(Debug, Clone)]
pub struct JsonService {
    service: &'static str,
    base_url: String,
    client: reqwest::Client,
}

impl JsonService {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport {
                service,
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(service = self.service, %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode(response).await
    }

    pub async fn get<Resp>(&self, path: &str, query: &[(&str, String)]) -> Result<Resp, ClientError>
    where
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(service = self.service, %url, "GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode(response).await
    }

    async fn decode<Resp: DeserializeOwned>(&self, response: reqwest::Response) -> Result<Resp, ClientError> {
        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Transport {
                service: self.service,
                message: format!("returned {}: {}", status, body),
            });
        }

        let api_response: ApiResponse<Resp> = response
            .json()
            .await
            .map_err(|e| ClientError::protocol(self.service, e.to_string()))?;
        api_response.into_result(self.service)
    }

    fn transport(&self, e: reqwest::Error) -> ClientError {
        ClientError::Transport {
            service: self.service,
            message: e.to_string(),
        }
    }
}
