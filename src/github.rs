// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! GitHub contents API client.
//!
//! `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}` yields the blob
//! SHA used as revision marker; `PUT` on the same resource writes new
//! base64 content, passing that SHA as the precondition.

use async_trait::async_trait;
use reqwest::{header, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ConfigError, GitHubConfig, Secret};
use crate::store::{
    CommitInfo, ContentStore, RemoteError, RepoTarget, RevisionMarker, WriteRequest,
};

const ACCEPT: &str = "application/vnd.github.v3+json";

/// Longest remote error message carried back to callers.
const MAX_ERROR_MESSAGE: usize = 512;

/// GitHub REST client for a single file resource.
pub struct GitHubClient {
    api_url: Url,
    token: Option<Secret>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    commit: CommitRef,
    #[serde(default)]
    content: Option<ContentsResponse>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GitHubClient {
    /// Create a new client from configuration.
    pub fn new(config: &GitHubConfig) -> Result<Self, ConfigError> {
        let api_url = Url::parse(&config.api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::InvalidApiUrl(config.api_url.clone()))?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            api_url,
            token: config.token.clone(),
            client,
        })
    }

    fn contents_url(&self, target: &RepoTarget) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", target.owner.as_str(), target.repo.as_str(), "contents"])
                .extend(target.path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, ACCEPT);

        match &self.token {
            Some(token) => {
                builder.header(header::AUTHORIZATION, format!("token {}", token.expose()))
            }
            None => builder,
        }
    }
}

#[async_trait]
impl ContentStore for GitHubClient {
    async fn read_marker(
        &self,
        target: &RepoTarget,
    ) -> Result<Option<RevisionMarker>, RemoteError> {
        let response = self
            .request(Method::GET, self.contents_url(target))
            .query(&[("ref", target.branch.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%target, "Remote file does not exist yet");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        let body: ContentsResponse = response.json().await.map_err(decode_error)?;
        debug!(%target, sha = %body.sha, "Read remote revision marker");
        Ok(Some(RevisionMarker::new(body.sha)))
    }

    async fn write(
        &self,
        target: &RepoTarget,
        request: &WriteRequest<'_>,
    ) -> Result<CommitInfo, RemoteError> {
        let payload = PutContents {
            message: request.message,
            content: request.encoded_content,
            branch: &target.branch,
            sha: request.marker.map(RevisionMarker::as_str),
        };

        let response = self
            .request(Method::PUT, self.contents_url(target))
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            let body: PutResponse = response.json().await.map_err(decode_error)?;
            return Ok(CommitInfo {
                commit_sha: body.commit.sha,
                content_marker: body.content.map(|c| RevisionMarker::new(c.sha)),
            });
        }

        match api_error(response).await {
            RemoteError::Api { status: 409, .. } => Err(RemoteError::Conflict),
            // A file created after our read is rejected with 422 "sha wasn't supplied"
            RemoteError::Api { status: 422, message } if message.contains("sha") => {
                debug!(%target, %message, "Missing precondition treated as conflict");
                Err(RemoteError::Conflict)
            }
            other => Err(other),
        }
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    warn!(error = %err, "GitHub request failed");
    RemoteError::Transport(err.to_string())
}

fn decode_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Api {
        status: StatusCode::BAD_GATEWAY.as_u16(),
        message: format!("Unexpected response body: {err}"),
    }
}

async fn api_error(response: reqwest::Response) -> RemoteError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();

    let mut message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    if message.len() > MAX_ERROR_MESSAGE {
        let mut cut = MAX_ERROR_MESSAGE;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }

    warn!(status, %message, "GitHub API returned an error");
    RemoteError::Api { status, message }
}
