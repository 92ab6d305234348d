// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Remote content store abstraction.
//!
//! The publisher only needs two operations from a version-controlled store:
//! read the current revision marker of a file, and write new content
//! conditioned on a marker. [`ContentStore`] captures exactly that so the
//! retry protocol can run against GitHub or an in-memory fake.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// A file in a repository on a specific branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub branch: String,
}

impl RepoTarget {
    /// Build a target from an `owner/repo` identifier.
    pub fn parse(repository: &str, path: &str, branch: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRepository(repository.to_string());

        let (owner, repo) = repository.trim().split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(invalid());
        }

        let path = path.trim_matches('/');
        if path.is_empty() || branch.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            branch: branch.to_string(),
        })
    }
}

impl fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}@{}", self.owner, self.repo, self.path, self.branch)
    }
}

/// Opaque identifier of one version of a remote file (the blob SHA on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionMarker(String);

impl RevisionMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conditional write. Borrowed so retries never copy the payload.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    /// Commit message
    pub message: &'a str,
    /// Content already in the store's transport encoding
    pub encoded_content: &'a str,
    /// Precondition; `None` creates the file
    pub marker: Option<&'a RevisionMarker>,
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Identifier of the new commit
    pub commit_sha: String,
    /// Revision marker of the written file, when the store reports it
    pub content_marker: Option<RevisionMarker>,
}

/// Failures reported by a [`ContentStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Revision marker no longer matches the remote file")]
    Conflict,

    #[error("Remote API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Transport failure: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Whether a read that failed this way is worth repeating.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Conflict => false,
        }
    }
}

/// A version-controlled file store with optimistic concurrency.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Current revision marker of `target`, or `None` if the file does not
    /// exist yet.
    async fn read_marker(
        &self,
        target: &RepoTarget,
    ) -> Result<Option<RevisionMarker>, RemoteError>;

    /// Write content, failing with [`RemoteError::Conflict`] when the
    /// request's marker no longer matches.
    async fn write(
        &self,
        target: &RepoTarget,
        request: &WriteRequest<'_>,
    ) -> Result<CommitInfo, RemoteError>;
}
