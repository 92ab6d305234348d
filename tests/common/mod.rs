// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared helpers for wiki saver integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use wiki_saver::{
    config::{Config, CredentialConfig, GitHubConfig, PublishConfig, Secret},
    handlers::{router, AppState},
    store::{CommitInfo, ContentStore, RemoteError, RepoTarget, RevisionMarker, WriteRequest},
};

/// In-memory version-controlled store with GitHub-like preconditions.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, (u64, Vec<u8>)>>,
    next_revision: Mutex<u64>,
    /// Conflicts to inject before honouring writes
    pub forced_conflicts: Mutex<u32>,
    pub writes: Mutex<u32>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn key(target: &RepoTarget) -> String {
        target.to_string()
    }

    pub fn seed(&self, target: &RepoTarget, content: &[u8]) {
        let revision = self.bump();
        self.files
            .lock()
            .unwrap()
            .insert(Self::key(target), (revision, content.to_vec()));
    }

    pub fn content(&self, target: &RepoTarget) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&Self::key(target))
            .map(|(_, content)| content.clone())
    }

    pub fn write_count(&self) -> u32 {
        *self.writes.lock().unwrap()
    }

    fn bump(&self) -> u64 {
        let mut next = self.next_revision.lock().unwrap();
        *next += 1;
        *next
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn read_marker(
        &self,
        target: &RepoTarget,
    ) -> Result<Option<RevisionMarker>, RemoteError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&Self::key(target))
            .map(|(rev, _)| RevisionMarker::new(format!("rev{rev}"))))
    }

    async fn write(
        &self,
        target: &RepoTarget,
        request: &WriteRequest<'_>,
    ) -> Result<CommitInfo, RemoteError> {
        *self.writes.lock().unwrap() += 1;

        {
            let mut forced = self.forced_conflicts.lock().unwrap();
            if *forced > 0 {
                *forced -= 1;
                return Err(RemoteError::Conflict);
            }
        }

        let key = Self::key(target);
        let current = self
            .files
            .lock()
            .unwrap()
            .get(&key)
            .map(|(rev, _)| format!("rev{rev}"));
        if current.as_deref() != request.marker.map(RevisionMarker::as_str) {
            return Err(RemoteError::Conflict);
        }

        let content = STANDARD
            .decode(request.encoded_content)
            .map_err(|e| RemoteError::Api {
                status: 422,
                message: e.to_string(),
            })?;
        let revision = self.bump();
        self.files.lock().unwrap().insert(key, (revision, content));

        Ok(CommitInfo {
            commit_sha: format!("commit{revision}"),
            content_marker: Some(RevisionMarker::new(format!("rev{revision}"))),
        })
    }
}

pub const GATE_PASSWORD: &str = "correct";
pub const ACCESS_TOKEN: &str = "tok123";
pub const SAVE_PASSWORD: &str = "save-me";

pub fn test_config() -> Config {
    Config {
        credentials: CredentialConfig {
            gate_password: Some(Secret::new(GATE_PASSWORD)),
            access_token: Some(Secret::new(ACCESS_TOKEN)),
            save_password: Some(Secret::new(SAVE_PASSWORD)),
        },
        github: GitHubConfig {
            repository: Some("octo/wiki".to_string()),
            ..Default::default()
        },
        publish: PublishConfig {
            retry_backoff_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn target() -> RepoTarget {
    RepoTarget::parse("octo/wiki", "index.html", "main").unwrap()
}

pub fn app(config: Config, store: Arc<dyn ContentStore>) -> Router {
    router(Arc::new(AppState::with_store(config, store).unwrap()))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn save_request(
    password: Option<&str>,
    content_type: &str,
    body: impl Into<Body>,
) -> Request<Body> {
    let mut builder = Request::post("/save")
        .header("content-type", content_type)
        .header("cf-connecting-ip", "198.51.100.1");
    if let Some(password) = password {
        builder = builder.header("x-password", password);
    }
    builder.body(body.into()).unwrap()
}

pub fn auth_request(body: &str) -> Request<Body> {
    Request::post("/api/auth")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
