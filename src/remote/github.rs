use crate::error::RemoteError;
use crate::remote::{RemoteFile, RemoteRepo};
use crate::vault::config::VaultConfig;
use crate::vault::util::truncate_with_ellipsis;
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use sha1::{Digest, Sha1};
use std::env;
use std::thread;
use std::time::Duration;

const USER_AGENT: &str = concat!("chatvault/", env!("CARGO_PKG_VERSION"));
const TRANSIENT_RETRIES: usize = 2;
const MAX_ERROR_BODY_CHARS: usize = 240;

#[derive(Debug, Deserialize)]
struct ContentEntry {
    sha: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: ContentEntry,
}

/// GitHub contents API. Version tokens are git blob SHA-1s.
pub struct GitHubRepo {
    client: Client,
    api_base: String,
    owner: String,
    name: String,
    prefix: Vec<String>,
    token: Option<String>,
}

/// Git's object id for a blob holding `content`.
pub fn git_blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn resolve_token() -> Option<String> {
    ["CHATVAULT_GITHUB_TOKEN", "GITHUB_TOKEN"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn map_send_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(err.to_string())
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn unexpected_status(status: StatusCode, body: &str) -> RemoteError {
    RemoteError::Transport(format!(
        "unexpected status {}: {}",
        status.as_u16(),
        truncate_with_ellipsis(body, MAX_ERROR_BODY_CHARS)
    ))
}

/// Write failures: 409 is a sha mismatch; 422 mentioning `sha` means the
/// file appeared or changed under us.
fn classify_write_failure(status: StatusCode, body: &str) -> RemoteError {
    match status {
        StatusCode::CONFLICT => RemoteError::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY if body.contains("sha") => RemoteError::Conflict,
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        _ => unexpected_status(status, body),
    }
}

impl GitHubRepo {
    pub fn new(
        repo: &str,
        prefix: &str,
        api_base: &str,
        timeout: Duration,
        token: Option<String>,
    ) -> Result<Self> {
        let (owner, name) = repo
            .trim()
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| anyhow!("remote repo `{repo}` must be `owner/name`"))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            prefix: prefix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            token,
        })
    }

    pub fn from_config(cfg: &VaultConfig) -> Result<Self> {
        if cfg.remote.repo.trim().is_empty() {
            anyhow::bail!("remote repo is not configured; set CHATVAULT_REMOTE_REPO=owner/name");
        }
        Self::new(
            &cfg.remote.repo,
            &cfg.remote.prefix,
            &cfg.remote.api_base,
            Duration::from_secs(cfg.sync.request_timeout_secs),
            resolve_token(),
        )
    }

    fn contents_url(&self, path: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|err| RemoteError::Transport(format!("invalid api base: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport("api base cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.name.as_str(), "contents"])
            .extend(self.prefix.iter().map(String::as_str))
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn send_with_retry<F>(&self, build: F) -> Result<Response, RemoteError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            let response = self.authorize(build()).send().map_err(map_send_error)?;
            if !is_transient(response.status()) || attempt >= TRANSIENT_RETRIES {
                return Ok(response);
            }
            attempt += 1;
            tracing::debug!(
                status = response.status().as_u16(),
                attempt,
                "transient GitHub response, retrying"
            );
            thread::sleep(Duration::from_millis(250 * attempt as u64));
        }
    }

    fn put_contents(
        &self,
        path: &str,
        message: &str,
        content: &[u8],
        expected_token: Option<&str>,
        branch: &str,
    ) -> Result<String, RemoteError> {
        let url = self.contents_url(path)?;
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        if let Some(sha) = expected_token {
            body["sha"] = json!(sha);
        }

        let response = self.send_with_retry(|| self.client.put(url.clone()).json(&body))?;
        let status = response.status();
        if status.is_success() {
            let parsed: WriteResponse = response
                .json()
                .map_err(|err| RemoteError::Transport(format!("invalid write response: {err}")))?;
            return Ok(parsed.content.sha);
        }
        let text = response.text().unwrap_or_default();
        Err(classify_write_failure(status, &text))
    }
}

impl RemoteRepo for GitHubRepo {
    fn get_file(&self, path: &str, branch: &str) -> Result<RemoteFile, RemoteError> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", branch);

        let response = self.send_with_retry(|| self.client.get(url.clone()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound);
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(unexpected_status(status, &text));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|err| RemoteError::Transport(format!("invalid contents response: {err}")))?;
        if value.is_array() {
            return Err(RemoteError::Transport(format!(
                "remote path {path} is a directory"
            )));
        }
        let entry: ContentEntry = serde_json::from_value(value)
            .map_err(|err| RemoteError::Transport(format!("invalid contents entry: {err}")))?;
        if !entry.kind.is_empty() && entry.kind != "file" {
            return Err(RemoteError::Transport(format!(
                "remote path {path} is a {}",
                entry.kind
            )));
        }
        Ok(RemoteFile {
            version_token: entry.sha,
        })
    }

    fn create_file(
        &self,
        path: &str,
        message: &str,
        content: &[u8],
        branch: &str,
    ) -> Result<String, RemoteError> {
        self.put_contents(path, message, content, None, branch)
    }

    fn update_file(
        &self,
        path: &str,
        message: &str,
        content: &[u8],
        expected_token: &str,
        branch: &str,
    ) -> Result<String, RemoteError> {
        self.put_contents(path, message, content, Some(expected_token), branch)
    }

    fn content_token(&self, content: &[u8]) -> String {
        git_blob_sha(content)
    }
}
