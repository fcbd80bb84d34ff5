//! Toggl v8 time-tracking API: start, stop, current entry, profile.

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

/// Marker stored in `created_with` on every entry we start.
pub const CREATED_WITH: &str = "Toggl Go";

/// Password half of the Basic credential when authenticating with a token.
const TOKEN_PASSWORD: &str = "api_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOp {
    Start,
    Stop,
    CurrentEntry,
    Profile,
}

impl std::fmt::Display for ApiOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiOp::Start => write!(f, "start timer"),
            ApiOp::Stop => write!(f, "stop timer"),
            ApiOp::CurrentEntry => write!(f, "current entry"),
            ApiOp::Profile => write!(f, "profile"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TimerApiError {
    #[error("{op} request failed: {source}")]
    Transport {
        op: ApiOp,
        #[source]
        source: reqwest::Error,
    },
    #[error("{op} returned HTTP {status}")]
    Status { op: ApiOp, status: u16 },
    #[error("{op} response could not be decoded: {message}")]
    Decode { op: ApiOp, message: String },
}

impl TimerApiError {
    pub fn op(&self) -> ApiOp {
        match self {
            TimerApiError::Transport { op, .. }
            | TimerApiError::Status { op, .. }
            | TimerApiError::Decode { op, .. } => *op,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeEntry {
    pub id: u64,
    #[serde(default)]
    pub wid: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub default_workspace_id: u64,
}

/// The four calls the conversation flow needs.
#[async_trait]
pub trait TimerApi: Send + Sync {
    /// Any 2xx is a started timer. The entry is `None` when the response
    /// body could not be read.
    async fn start_timer(&self, token: &str, workspace_id: u64)
        -> Result<Option<TimeEntry>, TimerApiError>;

    async fn stop_timer(&self, token: &str, entry_id: u64) -> Result<(), TimerApiError>;

    /// `Ok(None)` when nothing is running.
    async fn current_entry(&self, token: &str) -> Result<Option<TimeEntry>, TimerApiError>;

    async fn profile(&self, token: &str) -> Result<Profile, TimerApiError>;
}

/// `Basic base64(token:api_token)`.
pub fn basic_auth_header(token: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", token, TOKEN_PASSWORD))
    )
}

/// Toggl wraps every payload in `{"data": ...}`.
#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct MeData {
    default_wid: Option<u64>,
}

pub fn start_body(workspace_id: u64, now: chrono::DateTime<chrono::Utc>) -> serde_json::Value {
    json!({
        "time_entry": {
            "description": "",
            "created_with": CREATED_WITH,
            "start": now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "wid": workspace_id,
        }
    })
}

fn decode<T: serde::de::DeserializeOwned>(op: ApiOp, body: &str) -> Result<Envelope<T>, TimerApiError> {
    serde_json::from_str(body).map_err(|e| TimerApiError::Decode {
        op,
        message: e.to_string(),
    })
}

pub fn parse_current_entry(body: &str) -> Result<Option<TimeEntry>, TimerApiError> {
    Ok(decode::<TimeEntry>(ApiOp::CurrentEntry, body)?.data)
}

pub fn parse_profile(body: &str) -> Result<Profile, TimerApiError> {
    decode::<MeData>(ApiOp::Profile, body)?
        .data
        .and_then(|d| d.default_wid)
        .map(|default_workspace_id| Profile {
            default_workspace_id,
        })
        .ok_or_else(|| TimerApiError::Decode {
            op: ApiOp::Profile,
            message: "missing data.default_wid".to_string(),
        })
}

pub fn parse_started_entry(body: &str) -> Result<TimeEntry, TimerApiError> {
    decode::<TimeEntry>(ApiOp::Start, body)?
        .data
        .ok_or_else(|| TimerApiError::Decode {
            op: ApiOp::Start,
            message: "missing data".to_string(),
        })
}

/// Shared HTTP client for every outbound call.
pub fn build_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("TogglGo/1.0")
        .timeout(std::time::Duration::from_secs(config.http_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")
}

/// reqwest-backed client for the Toggl API.
#[derive(Clone)]
pub struct TogglClient {
    http: reqwest::Client,
    base_url: String,
}

impl TogglClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        Self::new(http, &config.timer_api_base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and return the body of a 2xx response. JSON bodies set
    /// their own content type.
    async fn send(
        &self,
        op: ApiOp,
        req: reqwest::RequestBuilder,
        token: &str,
    ) -> Result<String, TimerApiError> {
        let response = req
            .header("Authorization", basic_auth_header(token))
            .send()
            .await
            .map_err(|source| TimerApiError::Transport { op, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TimerApiError::Status {
                op,
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|source| TimerApiError::Transport { op, source })
    }
}

#[async_trait]
impl TimerApi for TogglClient {
    async fn start_timer(
        &self,
        token: &str,
        workspace_id: u64,
    ) -> Result<Option<TimeEntry>, TimerApiError> {
        let url = format!("{}/time_entries/start", self.base_url);
        let body = start_body(workspace_id, chrono::Utc::now());
        let text = self
            .send(ApiOp::Start, self.http.post(&url).json(&body), token)
            .await?;
        match parse_started_entry(&text) {
            Ok(entry) => {
                info!("Started time entry {} in workspace {}", entry.id, workspace_id);
                Ok(Some(entry))
            }
            Err(e) => {
                warn!("Timer started in workspace {} but {}", workspace_id, e);
                Ok(None)
            }
        }
    }

    async fn stop_timer(&self, token: &str, entry_id: u64) -> Result<(), TimerApiError> {
        let url = format!("{}/time_entries/{}/stop", self.base_url, entry_id);
        self.send(ApiOp::Stop, self.http.put(&url).json(&json!({})), token)
            .await?;
        info!("Stopped time entry {}", entry_id);
        Ok(())
    }

    async fn current_entry(&self, token: &str) -> Result<Option<TimeEntry>, TimerApiError> {
        let url = format!("{}/time_entries/current", self.base_url);
        let text = self
            .send(ApiOp::CurrentEntry, self.http.get(&url), token)
            .await?;
        parse_current_entry(&text)
    }

    async fn profile(&self, token: &str) -> Result<Profile, TimerApiError> {
        let url = format!("{}/me", self.base_url);
        let text = self.send(ApiOp::Profile, self.http.get(&url), token).await?;
        parse_profile(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_basic_auth_header() {
        // base64("abc:api_token")
        assert_eq!(basic_auth_header("abc"), "Basic YWJjOmFwaV90b2tlbg==");
    }

    #[test]
    fn test_start_body() {
        let now = chrono::Utc.with_ymd_and_hms(2018, 5, 1, 9, 30, 0).unwrap();
        let body = start_body(42, now);
        let entry = &body["time_entry"];
        assert_eq!(entry["wid"], 42);
        assert_eq!(entry["created_with"], "Toggl Go");
        assert_eq!(entry["description"], "");
        assert_eq!(entry["start"], "2018-05-01T09:30:00.000Z");
    }

    #[test]
    fn test_parse_current_entry_running() {
        let entry = parse_current_entry(r#"{"data":{"id":436694100,"wid":777,"description":"Meeting"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(entry.id, 436694100);
        assert_eq!(entry.wid, Some(777));
    }

    #[test]
    fn test_parse_current_entry_none_running() {
        assert_eq!(parse_current_entry(r#"{"data":null}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_current_entry_garbage() {
        let err = parse_current_entry("<html>").unwrap_err();
        assert_eq!(err.op(), ApiOp::CurrentEntry);
    }

    #[test]
    fn test_parse_profile() {
        let profile = parse_profile(r#"{"since":1,"data":{"id":1,"default_wid":777,"fullname":"X"}}"#).unwrap();
        assert_eq!(profile.default_workspace_id, 777);

        let err = parse_profile(r#"{"data":{"id":1}}"#).unwrap_err();
        assert!(matches!(err, TimerApiError::Decode { op: ApiOp::Profile, .. }));
    }

    #[test]
    fn test_parse_started_entry() {
        let entry = parse_started_entry(r#"{"data":{"id":5,"wid":777}}"#).unwrap();
        assert_eq!(entry.id, 5);
        assert_eq!(parse_started_entry(r#"{"data":null}"#).unwrap_err().op(), ApiOp::Start);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = TogglClient::new(reqwest::Client::new(), "http://localhost:9/api/v8/");
        assert_eq!(client.base_url(), "http://localhost:9/api/v8");
    }

    // ── Over the wire ──

    use crate::test_http::{serve_once, unreachable_url};

    fn client(base: &str) -> TogglClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        TogglClient::new(http, &format!("{}/api/v8", base))
    }

    #[tokio::test]
    async fn test_start_timer_request() {
        let (base, request) = serve_once(200, r#"{"data":{"id":5,"wid":42}}"#).await;
        let entry = client(&base).start_timer("tok", 42).await.unwrap();
        assert_eq!(entry.map(|e| e.id), Some(5));

        let request = request.await.unwrap();
        assert_eq!(request.request_line, "POST /api/v8/time_entries/start HTTP/1.1");
        assert_eq!(request.header("authorization"), Some(basic_auth_header("tok").as_str()));
        assert_eq!(request.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["time_entry"]["wid"], 42);
        assert_eq!(body["time_entry"]["created_with"], "Toggl Go");
    }

    #[tokio::test]
    async fn test_start_timer_unreadable_success_still_started() {
        for body in [r#"{"data":null}"#, ""] {
            let (base, _request) = serve_once(200, body).await;
            let entry = client(&base).start_timer("tok", 42).await.unwrap();
            assert_eq!(entry, None);
        }
    }

    #[tokio::test]
    async fn test_start_timer_rejected() {
        let (base, _request) = serve_once(403, "").await;
        let err = client(&base).start_timer("tok", 42).await.unwrap_err();
        assert!(matches!(err, TimerApiError::Status { op: ApiOp::Start, status: 403 }));
    }

    #[tokio::test]
    async fn test_stop_timer_request() {
        let (base, request) = serve_once(200, r#"{"data":{"id":7}}"#).await;
        client(&base).stop_timer("tok", 7).await.unwrap();

        let request = request.await.unwrap();
        assert_eq!(request.request_line, "PUT /api/v8/time_entries/7/stop HTTP/1.1");
        assert_eq!(request.header("authorization"), Some(basic_auth_header("tok").as_str()));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.body, "{}");
    }

    #[tokio::test]
    async fn test_stop_timer_rejected() {
        let (base, _request) = serve_once(500, "").await;
        let err = client(&base).stop_timer("tok", 7).await.unwrap_err();
        assert!(matches!(err, TimerApiError::Status { op: ApiOp::Stop, status: 500 }));
    }

    #[tokio::test]
    async fn test_current_entry_request() {
        let (base, request) = serve_once(200, r#"{"data":{"id":11,"wid":3}}"#).await;
        let entry = client(&base).current_entry("tok").await.unwrap();
        assert_eq!(entry.map(|e| e.id), Some(11));

        let request = request.await.unwrap();
        assert_eq!(request.request_line, "GET /api/v8/time_entries/current HTTP/1.1");
        assert_eq!(request.header("authorization"), Some(basic_auth_header("tok").as_str()));
        assert_eq!(request.header("content-type"), None);
    }

    #[tokio::test]
    async fn test_current_entry_nothing_running() {
        let (base, _request) = serve_once(200, r#"{"data":null}"#).await;
        assert_eq!(client(&base).current_entry("tok").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_current_entry_rejected() {
        let (base, _request) = serve_once(401, "").await;
        let err = client(&base).current_entry("tok").await.unwrap_err();
        assert!(matches!(
            err,
            TimerApiError::Status { op: ApiOp::CurrentEntry, status: 401 }
        ));
    }

    #[tokio::test]
    async fn test_profile_request() {
        let (base, request) = serve_once(200, r#"{"data":{"id":1,"default_wid":777}}"#).await;
        let profile = client(&base).profile("tok").await.unwrap();
        assert_eq!(profile.default_workspace_id, 777);

        let request = request.await.unwrap();
        assert_eq!(request.request_line, "GET /api/v8/me HTTP/1.1");
        assert_eq!(request.header("authorization"), Some(basic_auth_header("tok").as_str()));
        assert_eq!(request.header("content-type"), None);
    }

    #[tokio::test]
    async fn test_profile_rejected() {
        let (base, _request) = serve_once(500, "").await;
        let err = client(&base).profile("tok").await.unwrap_err();
        assert!(matches!(err, TimerApiError::Status { op: ApiOp::Profile, status: 500 }));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let base = unreachable_url().await;
        let err = client(&base).profile("tok").await.unwrap_err();
        assert!(matches!(err, TimerApiError::Transport { op: ApiOp::Profile, .. }));
    }
}
