use gloo_net::http::{Request, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned status {status}")]
    Status { status: u16, message: String },
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text for a user-facing dialog; prefers the server-supplied message
    /// when there is one.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<gloo_net::Error> for ApiError {
    fn from(err: gloo_net::Error) -> Self {
        match err {
            gloo_net::Error::SerdeError(e) => ApiError::Decode(e.to_string()),
            other => ApiError::Network(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    Private,
    Restricted,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Private => "private",
            AccessLevel::Restricted => "restricted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub pattern: String,
    pub access: AccessLevel,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FolderEntry {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub level: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BackupEntry {
    pub name: String,
    pub date: String,
    pub size: u64,
    pub url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BackupJob {
    pub status: JobState,
    #[serde(default)]
    pub progress: u32,
    #[serde(default, rename = "currentFile")]
    pub current_file: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct RuleList {
    #[serde(default)]
    rules: Vec<AccessRule>,
}

#[derive(Deserialize)]
struct FolderList {
    #[serde(default)]
    folders: Vec<FolderEntry>,
}

#[derive(Deserialize)]
struct BackupList {
    #[serde(default)]
    backups: Vec<BackupEntry>,
}

#[derive(Deserialize)]
struct StartedJob {
    #[serde(rename = "statusUrl")]
    status_url: String,
}

#[derive(Serialize)]
struct ReorderBody<'a> {
    indices: &'a [usize],
}

/// Client for the wiki server API. All entities live server-side; callers
/// re-fetch after each mutation instead of patching local copies.
#[derive(Clone, Default)]
pub struct ApiClient {
    base: String,
}

impl ApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn list_rules(&self) -> Result<Vec<AccessRule>, ApiError> {
        let response = Request::get(&self.url("/api/access-rules")).send().await?;
        let list: RuleList = decode_json(response).await?;
        Ok(list.rules)
    }

    pub async fn create_rule(&self, rule: &AccessRule) -> Result<(), ApiError> {
        let response = Request::post(&self.url("/api/access-rules"))
            .json(rule)?
            .send()
            .await?;
        expect_ok(response).await
    }

    pub async fn update_rule(&self, index: usize, rule: &AccessRule) -> Result<(), ApiError> {
        let response = Request::put(&self.url(&format!("/api/access-rules/{index}")))
            .json(rule)?
            .send()
            .await?;
        expect_ok(response).await
    }

    pub async fn delete_rule(&self, index: usize) -> Result<(), ApiError> {
        let response = Request::delete(&self.url(&format!("/api/access-rules/{index}")))
            .send()
            .await?;
        expect_ok(response).await
    }

    pub async fn reorder_rules(&self, indices: &[usize]) -> Result<(), ApiError> {
        let response = Request::post(&self.url("/api/access-rules/reorder"))
            .json(&ReorderBody { indices })?
            .send()
            .await?;
        expect_ok(response).await
    }

    pub async fn list_folders(&self) -> Result<Vec<FolderEntry>, ApiError> {
        let response = Request::get(&self.url("/api/folders")).send().await?;
        let list: FolderList = decode_json(response).await?;
        Ok(list.folders)
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupEntry>, ApiError> {
        let response = Request::get(&self.url("/api/backup/list")).send().await?;
        let list: BackupList = decode_json(response).await?;
        Ok(list.backups)
    }

    /// Kicks off a backup job; returns the URL to poll for status.
    pub async fn start_backup(&self) -> Result<String, ApiError> {
        let response = Request::post(&self.url("/api/backup/start")).send().await?;
        let started: StartedJob = decode_json(response).await?;
        Ok(started.status_url)
    }

    pub async fn backup_status(&self, status_url: &str) -> Result<BackupJob, ApiError> {
        let response = Request::get(status_url).send().await?;
        decode_json(response).await
    }

    pub async fn delete_backup(&self, name: &str) -> Result<(), ApiError> {
        let response = Request::delete(&self.url(&format!("/api/backup/delete/{name}")))
            .send()
            .await?;
        expect_ok(response).await
    }

    /// Server-side markdown rendering. `path` is the document path of the
    /// page being edited, so relative links resolve the same way they will
    /// after saving.
    pub async fn render_markdown(&self, path: &str, content: &str) -> Result<String, ApiError> {
        let encoded: String = js_sys::encode_uri_component(path).into();
        let response = Request::post(&self.url(&format!("/api/render-markdown?path={encoded}")))
            .header("content-type", "text/plain")
            .body(content.to_string())?
            .send()
            .await?;
        if !response.ok() {
            return Err(status_error(response).await);
        }
        Ok(response.text().await?)
    }

    /// Returns `Ok(false)` on 401 so callers can branch without treating an
    /// anonymous session as an error.
    pub async fn check_auth(&self) -> Result<bool, ApiError> {
        let response = Request::get(&self.url("/api/check-auth")).send().await?;
        if response.status() == 401 {
            return Ok(false);
        }
        if !response.ok() {
            return Err(status_error(response).await);
        }
        Ok(true)
    }
}

async fn decode_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ApiError> {
    if !response.ok() {
        return Err(status_error(response).await);
    }
    Ok(response.json::<T>().await?)
}

async fn expect_ok(response: Response) -> Result<(), ApiError> {
    if !response.ok() {
        return Err(status_error(response).await);
    }
    Ok(())
}

async fn status_error(response: Response) -> ApiError {
    #[derive(Deserialize, Default)]
    struct ServerError {
        #[serde(default)]
        message: String,
    }
    let status = response.status();
    let message = response
        .json::<ServerError>()
        .await
        .map(|e| e.message)
        .unwrap_or_default();
    ApiError::Status { status, message }
}
