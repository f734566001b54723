use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;

// ── Wire types ────────────────────────────────────────────────────────────────

/// What a repository load returns. Replaced wholesale on every re-load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoStats {
    pub files_count: u64,
    #[serde(default)]
    pub chunks_count: ChunksCount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_paths: Option<Vec<String>>,
}

impl RepoStats {
    /// The summary, if the service produced a non-empty one.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// The service reports either a chunk count or a label such as "Stored in DB".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunksCount {
    Count(u64),
    Label(String),
}

impl Default for ChunksCount {
    fn default() -> Self {
        ChunksCount::Count(0)
    }
}

impl std::fmt::Display for ChunksCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunksCount::Count(n) => write!(f, "{n}"),
            ChunksCount::Label(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoadRepoRequest<'a> {
    github_url: &'a str,
    reindex: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    answer: String,
}

// ── Service seam ──────────────────────────────────────────────────────────────

/// The remote indexing/chat service. Neither call retries; both may fail.
#[async_trait]
pub trait RepoService: Send + Sync {
    async fn load_repository(&self, url: &str, force_refresh: bool) -> Result<RepoStats, ServiceError>;
    async fn ask_question(&self, prompt: &str, model: &str) -> Result<String, ServiceError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

pub struct Client {
    http: reqwest::Client,
    pub endpoint: String,
}

impl Client {
    pub fn new(endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.endpoint.trim_end_matches('/'))
    }

    async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ServiceError> {
        let resp = self
            .http
            .post(self.api_url(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ServiceError::api(status.as_u16(), detail_from_body(status, &text)));
        }
        serde_json::from_str(&text).map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RepoService for Client {
    async fn load_repository(&self, url: &str, force_refresh: bool) -> Result<RepoStats, ServiceError> {
        let req = LoadRepoRequest { github_url: url, reindex: force_refresh };
        self.post_json("load-repo", &req).await
    }

    async fn ask_question(&self, prompt: &str, model: &str) -> Result<String, ServiceError> {
        let req = ChatRequest { query: prompt, model };
        let resp: ChatResponse = self.post_json("chat", &req).await?;
        Ok(resp.answer)
    }
}

/// Human-readable reason for a failed call: the backend's `detail` field when
/// present (structured details are rendered as JSON), else status + body.
fn detail_from_body(status: StatusCode, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        match v.get("detail") {
            Some(Value::String(s)) => return s.clone(),
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }
    let body = body.trim();
    if body.is_empty() {
        format!("API error {status}")
    } else {
        format!("API error {status}: {body}")
    }
}
