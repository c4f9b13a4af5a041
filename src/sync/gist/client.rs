use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::sync::config::BackupProfile;
use crate::sync::credentials::CredentialStore;
use crate::sync::envelope::SyncData;
use crate::sync::remote::{RemoteError, RemoteProvider, RemoteStorage, UserIdentity};

const USER_AGENT: &str = concat!("marksync/", env!("CARGO_PKG_VERSION"));

/// One file of a Gist as returned by `GET /gists/{id}`
#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, PartialEq)]
enum FileContent {
    Missing,
    Inline(String),
    /// Too large to be inlined; fetch it from the raw URL
    Truncated(String),
}

fn file_content(gist: GistResponse, file_name: &str) -> FileContent {
    let Some(file) = gist.files.into_iter().find_map(|(name, f)| (name == file_name).then_some(f)) else {
        return FileContent::Missing;
    };
    match (file.truncated, file.raw_url, file.content) {
        (true, Some(raw_url), _) => FileContent::Truncated(raw_url),
        (_, _, Some(content)) => FileContent::Inline(content),
        _ => FileContent::Missing,
    }
}

/// An empty file counts as "nothing pushed yet".
fn parse_sync_data(content: &str) -> Result<Option<SyncData>, RemoteError> {
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(SyncData::from_json(content)?))
}

fn map_status(status: StatusCode, headers: &HeaderMap, message: String) -> RemoteError {
    let rate_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::AuthFailed,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        StatusCode::FORBIDDEN if rate_exhausted => RemoteError::RateLimited,
        StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        status => RemoteError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

/// GitHub puts a human readable `message` in error bodies.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// GitHub Gist client for one backup document
pub struct GistClient {
    client: Client,
    base_url: String,
    token: String,
    gist_id: String,
    file_name: String,
}

impl GistClient {
    pub fn new(base_url: &str, token: &str, gist_id: &str, file_name: &str) -> Result<Self, RemoteError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::Network(format!("invalid API URL: {}", base_url)));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
            gist_id: gist_id.to_string(),
            file_name: file_name.to_string(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn gist_url(&self) -> String {
        format!("{}/gists/{}", self.base_url, self.gist_id)
    }

    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &headers, error_message(&body)))
    }
}

#[async_trait]
impl RemoteStorage for GistClient {
    async fn read(&self) -> Result<Option<SyncData>, RemoteError> {
        let response = self.request(Method::GET, &self.gist_url()).send().await?;
        let gist: GistResponse = Self::check(response).await?.json().await?;

        let content = match file_content(gist, &self.file_name) {
            FileContent::Missing => {
                log::info!("Gist: {} has no file {}", self.gist_id, self.file_name);
                return Ok(None);
            }
            FileContent::Inline(content) => content,
            FileContent::Truncated(raw_url) => {
                log::debug!("Gist: {} is truncated, fetching raw content", self.file_name);
                let response = self.request(Method::GET, &raw_url).send().await?;
                Self::check(response).await?.text().await?
            }
        };
        parse_sync_data(&content)
    }

    async fn write(&self, data: &SyncData) -> Result<(), RemoteError> {
        let body = json!({
            "files": {
                self.file_name.as_str(): { "content": data.to_json()? }
            }
        });
        let response = self.request(Method::PATCH, &self.gist_url()).json(&body).send().await?;
        Self::check(response).await?;
        log::info!("Gist: wrote {} to {}", self.file_name, self.gist_id);
        Ok(())
    }

    async fn get_user_identity(&self) -> Result<Option<UserIdentity>, RemoteError> {
        let url = format!("{}/user", self.base_url);
        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let user: GitHubUser = Self::check(response).await?.json().await?;
        Ok(Some(UserIdentity {
            display_name: user.name.filter(|n| !n.is_empty()).unwrap_or(user.login),
            avatar_url: user.avatar_url,
        }))
    }
}

/// Builds Gist clients, resolving each profile's token.
pub struct GistProvider {
    api_base_url: String,
    credentials: CredentialStore,
}

impl GistProvider {
    pub fn new(api_base_url: impl Into<String>, credentials: CredentialStore) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            credentials,
        }
    }
}

impl RemoteProvider for GistProvider {
    fn remote_for(&self, profile: &BackupProfile) -> Result<Arc<dyn RemoteStorage>, RemoteError> {
        let token = self
            .credentials
            .token(profile.id)
            .ok_or_else(|| RemoteError::MissingCredentials(profile.name.clone()))?;
        let client = GistClient::new(&self.api_base_url, &token, &profile.gist_id, &profile.file_name)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::BookmarkNode;
    use reqwest::header::HeaderValue;

    fn gist(json: &str) -> GistResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_inline_file_content() {
        let response = gist(r#"{"id":"g","files":{"bookmarks.json":{"filename":"bookmarks.json","content":"{}","truncated":false,"raw_url":"https://raw/x"}}}"#);
        assert_eq!(file_content(response, "bookmarks.json"), FileContent::Inline("{}".to_string()));
    }

    #[test]
    fn test_truncated_file_uses_raw_url() {
        let response = gist(r#"{"files":{"bookmarks.json":{"content":"{\"ver","truncated":true,"raw_url":"https://raw/x"}}}"#);
        assert_eq!(
            file_content(response, "bookmarks.json"),
            FileContent::Truncated("https://raw/x".to_string())
        );
    }

    #[test]
    fn test_missing_file() {
        let response = gist(r#"{"files":{"other.txt":{"content":"hi"}}}"#);
        assert_eq!(file_content(response, "bookmarks.json"), FileContent::Missing);
    }

    #[test]
    fn test_parse_sync_data() {
        assert!(parse_sync_data("  \n").unwrap().is_none());
        assert!(matches!(parse_sync_data("not json"), Err(RemoteError::InvalidPayload(_))));

        let data = SyncData::new(vec![BookmarkNode::folder("", vec![])]);
        let parsed = parse_sync_data(&data.to_json().unwrap()).unwrap().unwrap();
        assert_eq!(parsed.checksum, data.checksum);
    }

    #[test]
    fn test_status_mapping() {
        let none = HeaderMap::new();
        let mut exhausted = HeaderMap::new();
        exhausted.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));

        assert!(matches!(map_status(StatusCode::UNAUTHORIZED, &none, String::new()), RemoteError::AuthFailed));
        assert!(matches!(map_status(StatusCode::FORBIDDEN, &exhausted, String::new()), RemoteError::RateLimited));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, &none, String::new()),
            RemoteError::PermissionDenied(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, &none, String::new()),
            RemoteError::RateLimited
        ));
        assert!(matches!(map_status(StatusCode::NOT_FOUND, &none, String::new()), RemoteError::NotFound(_)));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, &none, "bad".into()),
            RemoteError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn test_error_message_prefers_github_message() {
        assert_eq!(error_message(r#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(error_message("plain text "), "plain text");
    }

    #[test]
    fn test_client_rejects_non_http_base() {
        assert!(GistClient::new("ftp://example", "t", "g", "f").is_err());
    }
}
