//! ---
//! hpc_section: "03-cloud-synchronization"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Cloud API client and retry queue."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! HTTP client for the controller cloud API.
//!
//! The cloud can piggyback an `x-fetch` response header on any call to
//! tell the agent that server-side objects changed. Calls that observe
//! it return the tags in [`CloudResponse::refetch`] and the caller
//! decides what to re-sync; calls that must not recurse (config fetch
//! itself, alarm delivery, queued retries) simply never look at the
//! header.

mod retry;

use std::time::Duration;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use hpc_types::{CloudConfig, ScheduleBatch};

pub use retry::{
    retry_channel, run_cloud_retry_worker, run_retry_worker, RetryEnvelope, RetrySender,
    DEFAULT_QUEUE_CAPACITY,
};

pub const CONFIG_PATH: &str = "api/controller/config-v1";
const SCHEDULE_PATH: &str = "api/controller/schedule-v1";
const TOKEN_PATH: &str = "api/token-v1";
pub const METRICS_PATH: &str = "api/controller/metrics-v1";
pub const METER_PATH: &str = "api/controller/meter-v1";
pub const ALARM_PATH: &str = "api/controller/alarm-v1";
pub const ALARMS_PATH: &str = "api/controller/alarms-v1";

/// Refetch tag naming the device configuration object.
pub const REFETCH_CONFIG: &str = "ControllerConfig";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("building cloud client: {0}")]
    Setup(#[from] url::ParseError),

    #[error("{method} {url}: {source}")]
    Transport {
        method: Method,
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url}: status {status}, body: {body}")]
    Status {
        method: Method,
        url: Url,
        status: StatusCode,
        body: String,
    },

    #[error("decoding {url} response: {source}")]
    Decode {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("encoding request body for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The original delivery failed and the retry queue had no room
    /// left for it.
    #[error("retry queue full, dropping {path}: {source}")]
    QueueFull {
        path: String,
        #[source]
        source: Box<CloudError>,
    },
}

/// A decoded response plus any refetch tags the server attached.
#[derive(Debug)]
pub struct CloudResponse<T> {
    pub value: T,
    pub refetch: Vec<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "Token")]
    token: String,
}

/// Authenticated client for one controller. The token is interior so a
/// refresh takes effect for every caller holding the client in an
/// `Arc`.
pub struct CloudClient {
    http: reqwest::Client,
    base: Url,
    token: RwLock<String>,
    serial: Option<String>,
}

impl CloudClient {
    pub fn new(server: &str, token: String, serial: Option<String>) -> Result<Self, CloudError> {
        // Url::join drops the last path segment without a trailing
        // slash.
        let mut base = server.to_owned();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| CloudError::Transport {
                method: Method::GET,
                url: base.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base,
            token: RwLock::new(token),
            serial,
        })
    }

    pub fn token(&self) -> String {
        self.token.read().clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url, CloudError> {
        Ok(self.base.join(path)?)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&self.token.read()) {
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(serial) = &self.serial {
            if let Ok(value) = HeaderValue::from_str(serial) {
                headers.insert("x-serial", value);
            }
        }
        headers
    }

    /// One round trip. Returns the response and, when `observe_refetch`
    /// is set, the parsed `x-fetch` tags.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        extra_header: Option<(&'static str, &str)>,
        observe_refetch: bool,
    ) -> Result<(reqwest::Response, Vec<String>), CloudError> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "cloud request");

        let mut request = self.http.request(method.clone(), url.clone()).headers(self.headers());
        if let Some((name, value)) = extra_header {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|source| CloudError::Transport {
            method: method.clone(),
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Status {
                method,
                url,
                status,
                body,
            });
        }

        let refetch = if observe_refetch {
            parse_refetch(
                response
                    .headers()
                    .get("x-fetch")
                    .and_then(|value| value.to_str().ok()),
            )
        } else {
            Vec::new()
        };
        Ok((response, refetch))
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, CloudError> {
        let url = self.endpoint(path)?;
        response
            .json()
            .await
            .map_err(|source| CloudError::Decode { url, source })
    }

    /// Fetch the device configuration. When the fetch was triggered by
    /// a refetch tag, the tag is echoed back in the request `x-fetch`
    /// header so the server can clear its dirty flag.
    pub async fn fetch_config(&self, refetch_tag: Option<&str>) -> Result<CloudConfig, CloudError> {
        let extra = refetch_tag.map(|tag| ("x-fetch", tag));
        let (response, _) = self.send(Method::GET, CONFIG_PATH, None, extra, false).await?;
        self.decode(CONFIG_PATH, response).await
    }

    pub async fn fetch_schedule(&self) -> Result<CloudResponse<ScheduleBatch>, CloudError> {
        let (response, refetch) = self.send(Method::GET, SCHEDULE_PATH, None, None, true).await?;
        let batch = self.decode(SCHEDULE_PATH, response).await?;
        Ok(CloudResponse {
            value: batch,
            refetch,
        })
    }

    /// Rotate the API token. The new token is installed immediately
    /// and returned so the caller can persist it.
    pub async fn refresh_token(&self) -> Result<CloudResponse<String>, CloudError> {
        let (response, refetch) = self.send(Method::POST, TOKEN_PATH, None, None, true).await?;
        let decoded: TokenResponse = self.decode(TOKEN_PATH, response).await?;
        *self.token.write() = decoded.token.clone();
        Ok(CloudResponse {
            value: decoded.token,
            refetch,
        })
    }

    /// Fire-and-forget POST that neither observes refetch tags nor
    /// enqueues on failure. Used for alarm delivery.
    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), CloudError> {
        let body = encode(path, body)?;
        self.send(Method::POST, path, Some(body), None, false).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), CloudError> {
        self.send(Method::DELETE, path, None, None, false).await?;
        Ok(())
    }

    /// POST with store-and-forward: on any failure the serialized body
    /// goes to the retry queue and the original error is returned.
    /// Success surfaces the refetch tags.
    pub async fn post_with_retry<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        retry: &RetrySender,
    ) -> Result<Vec<String>, CloudError> {
        let body = encode(path, body)?;
        match self
            .send(Method::POST, path, Some(body.clone()), None, true)
            .await
        {
            Ok((_, refetch)) => Ok(refetch),
            Err(err) => Err(retry.enqueue_failed(path, body, err)),
        }
    }

    /// Raw delivery of a queued envelope. Refetch tags are ignored so a
    /// drained backlog cannot trigger config sync storms.
    pub(crate) async fn post_raw(&self, envelope: &RetryEnvelope) -> Result<(), CloudError> {
        self.send(
            Method::POST,
            &envelope.path,
            Some(envelope.body.clone()),
            None,
            false,
        )
        .await?;
        Ok(())
    }
}

fn encode<T: Serialize>(path: &str, body: &T) -> Result<String, CloudError> {
    serde_json::to_string(body).map_err(|source| CloudError::Encode {
        path: path.to_owned(),
        source,
    })
}

fn parse_refetch(header: Option<&str>) -> Vec<String> {
    let Some(header) = header else {
        return Vec::new();
    };
    header
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect()
}
