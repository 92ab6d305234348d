// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Remote write protocol.
//!
//! A publish runs `encode -> read marker -> conditional write`:
//!
//! - The read is retried on transient failures (transport errors, 429, 5xx)
//!   up to `max_attempts` times. A missing file yields no marker and the
//!   write creates it.
//! - The write is retried on conflicts and transport errors, again up to
//!   `max_attempts` times. Any other remote error ends the publish at once.
//! - Attempt `n` is followed by a sleep of `n` backoff units.
//!
//! With `reread_on_conflict` the marker is fetched again before every
//! conflict retry; otherwise the first marker is reused, which can only
//! succeed if the competing writer restores the file.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PublishConfig;
use crate::encoding::encode_chunked;
use crate::error::PublishError;
use crate::store::{
    CommitInfo, ContentStore, RemoteError, RepoTarget, RevisionMarker, WriteRequest,
};

/// Commits content to a [`ContentStore`] with bounded retry.
pub struct Publisher {
    store: Arc<dyn ContentStore>,
    max_attempts: u32,
    backoff_unit: Duration,
    reread_on_conflict: bool,
}

impl Publisher {
    pub fn new(store: Arc<dyn ContentStore>, config: &PublishConfig) -> Self {
        Self {
            store,
            max_attempts: config.max_attempts.max(1),
            backoff_unit: config.backoff_unit(),
            reread_on_conflict: config.reread_on_conflict,
        }
    }

    /// Commit `content` to `target`.
    pub async fn publish(
        &self,
        target: &RepoTarget,
        content: &[u8],
    ) -> Result<CommitInfo, PublishError> {
        let encoded = encode_chunked(content);
        let message = commit_message(Utc::now());
        debug!(%target, bytes = content.len(), encoded = encoded.len(), "Publishing content");

        let mut marker = self.read_marker(target).await?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = WriteRequest {
                message: &message,
                encoded_content: &encoded,
                marker: marker.as_ref(),
            };

            match self.store.write(target, &request).await {
                Ok(commit) => {
                    info!(
                        %target,
                        commit = %commit.commit_sha,
                        attempt,
                        created = marker.is_none(),
                        "Content committed"
                    );
                    return Ok(commit);
                }
                Err(RemoteError::Conflict) => {
                    if attempt >= self.max_attempts {
                        warn!(%target, attempts = attempt, "Write conflict persisted, giving up");
                        return Err(PublishError::Conflict { attempts: attempt });
                    }
                    warn!(%target, attempt, "Write conflict, retrying");
                    self.backoff(attempt).await;
                    if self.reread_on_conflict {
                        marker = self.read_marker(target).await?;
                    }
                }
                Err(err @ RemoteError::Transport(_)) => {
                    if attempt >= self.max_attempts {
                        warn!(%target, attempts = attempt, error = %err, "Write failed, giving up");
                        return Err(err.into());
                    }
                    warn!(%target, attempt, error = %err, "Write failed, retrying");
                    self.backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Read the current marker, retrying transient failures.
    async fn read_marker(
        &self,
        target: &RepoTarget,
    ) -> Result<Option<RevisionMarker>, PublishError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.store.read_marker(target).await {
                Ok(marker) => return Ok(marker),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(%target, attempt, error = %err, "Marker read failed, retrying");
                    self.backoff(attempt).await;
                }
                Err(err) => {
                    warn!(%target, attempts = attempt, error = %err, "Marker read failed");
                    return Err(err.into());
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.backoff_unit.saturating_mul(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Human-readable commit message stamped with the save time.
pub fn commit_message(now: DateTime<Utc>) -> String {
    format!(
        "Update wiki - {}",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Store that replays scripted results and records what it saw.
    #[derive(Default)]
    struct ScriptedStore {
        reads: Mutex<VecDeque<Result<Option<RevisionMarker>, RemoteError>>>,
        writes: Mutex<VecDeque<Result<CommitInfo, RemoteError>>>,
        read_calls: Mutex<u32>,
        read_times: Mutex<Vec<Instant>>,
        seen_markers: Mutex<Vec<Option<String>>>,
        seen_content: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn new(
            reads: Vec<Result<Option<RevisionMarker>, RemoteError>>,
            writes: Vec<Result<CommitInfo, RemoteError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                reads: Mutex::new(reads.into()),
                writes: Mutex::new(writes.into()),
                ..Default::default()
            })
        }

        fn read_calls(&self) -> u32 {
            *self.read_calls.lock().unwrap()
        }

        fn seen_markers(&self) -> Vec<Option<String>> {
            self.seen_markers.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentStore for ScriptedStore {
        async fn read_marker(
            &self,
            _target: &RepoTarget,
        ) -> Result<Option<RevisionMarker>, RemoteError> {
            *self.read_calls.lock().unwrap() += 1;
            self.read_times.lock().unwrap().push(Instant::now());
            self.reads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Some(RevisionMarker::new("latest"))))
        }

        async fn write(
            &self,
            _target: &RepoTarget,
            request: &WriteRequest<'_>,
        ) -> Result<CommitInfo, RemoteError> {
            self.seen_markers
                .lock()
                .unwrap()
                .push(request.marker.map(|m| m.as_str().to_string()));
            self.seen_content
                .lock()
                .unwrap()
                .push(request.encoded_content.to_string());
            self.writes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(commit("default")))
        }
    }

    fn commit(sha: &str) -> CommitInfo {
        CommitInfo {
            commit_sha: sha.to_string(),
            content_marker: None,
        }
    }

    fn marker(sha: &str) -> Result<Option<RevisionMarker>, RemoteError> {
        Ok(Some(RevisionMarker::new(sha)))
    }

    fn target() -> RepoTarget {
        RepoTarget::parse("octo/wiki", "index.html", "main").unwrap()
    }

    fn publisher(store: Arc<ScriptedStore>, reread: bool) -> Publisher {
        Publisher::new(
            store,
            &PublishConfig {
                retry_backoff_ms: 0,
                reread_on_conflict: reread,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_creates_missing_file_without_precondition() {
        let store = ScriptedStore::new(vec![Ok(None)], vec![Ok(commit("c1"))]);
        let result = publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap();

        assert_eq!(result.commit_sha, "c1");
        assert_eq!(store.seen_markers(), vec![None]);
        assert_eq!(store.seen_content.lock().unwrap()[0], "SGVsbG8=");
    }

    #[tokio::test]
    async fn test_updates_existing_file_with_marker() {
        let store = ScriptedStore::new(vec![marker("abc")], vec![Ok(commit("c2"))]);
        publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap();
        assert_eq!(store.seen_markers(), vec![Some("abc".to_string())]);
    }

    #[tokio::test]
    async fn test_two_conflicts_then_success() {
        let store = ScriptedStore::new(
            vec![marker("v1"), marker("v2"), marker("v3")],
            vec![
                Err(RemoteError::Conflict),
                Err(RemoteError::Conflict),
                Ok(commit("c3")),
            ],
        );
        let result = publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap();

        assert_eq!(result.commit_sha, "c3");
        assert_eq!(store.read_calls(), 3);
        assert_eq!(
            store.seen_markers(),
            vec![Some("v1".into()), Some("v2".into()), Some("v3".into())]
        );
    }

    #[tokio::test]
    async fn test_three_conflicts_is_a_conflict_error() {
        let store = ScriptedStore::new(
            vec![],
            vec![
                Err(RemoteError::Conflict),
                Err(RemoteError::Conflict),
                Err(RemoteError::Conflict),
                Ok(commit("never")),
            ],
        );
        let err = publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Conflict { attempts: 3 }));
        assert_eq!(store.seen_markers().len(), 3);
    }

    #[tokio::test]
    async fn test_without_reread_reuses_first_marker() {
        let store = ScriptedStore::new(
            vec![marker("v1")],
            vec![Err(RemoteError::Conflict), Ok(commit("c4"))],
        );
        publisher(store.clone(), false)
            .publish(&target(), b"Hello")
            .await
            .unwrap();

        assert_eq!(store.read_calls(), 1);
        assert_eq!(
            store.seen_markers(),
            vec![Some("v1".into()), Some("v1".into())]
        );
    }

    #[tokio::test]
    async fn test_transient_read_failures_are_retried() {
        let store = ScriptedStore::new(
            vec![
                Err(RemoteError::Transport("reset".into())),
                Err(RemoteError::Api {
                    status: 503,
                    message: "unavailable".into(),
                }),
                marker("v1"),
            ],
            vec![Ok(commit("c5"))],
        );
        publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap();
        assert_eq!(store.read_calls(), 3);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_bound() {
        let store = ScriptedStore::new(
            vec![
                Err(RemoteError::Transport("a".into())),
                Err(RemoteError::Transport("b".into())),
                Err(RemoteError::Transport("c".into())),
            ],
            vec![],
        );
        let err = publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::RemoteApi { status: 502, .. }));
        assert_eq!(store.read_calls(), 3);
        assert!(store.seen_markers().is_empty());
    }

    #[tokio::test]
    async fn test_permission_error_is_not_retried() {
        let store = ScriptedStore::new(
            vec![Ok(None)],
            vec![Err(RemoteError::Api {
                status: 403,
                message: "Resource not accessible by integration".into(),
            })],
        );
        let err = publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap_err();

        match err {
            PublishError::RemoteApi { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("not accessible"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.seen_markers().len(), 1);
    }

    #[tokio::test]
    async fn test_write_transport_failure_is_retried() {
        let store = ScriptedStore::new(
            vec![Ok(None)],
            vec![Err(RemoteError::Transport("timeout".into())), Ok(commit("c6"))],
        );
        let result = publisher(store.clone(), true)
            .publish(&target(), b"Hello")
            .await
            .unwrap();
        assert_eq!(result.commit_sha, "c6");
        // Transport retries keep the marker; no extra read
        assert_eq!(store.read_calls(), 1);
    }

    #[tokio::test]
    async fn test_large_payload_round_trips() {
        let content: Vec<u8> = (0..200 * 1024).map(|i| (i % 256) as u8).collect();
        let store = ScriptedStore::new(vec![Ok(None)], vec![Ok(commit("c7"))]);
        publisher(store.clone(), true)
            .publish(&target(), &content)
            .await
            .unwrap();

        let sent = store.seen_content.lock().unwrap()[0].clone();
        assert_eq!(STANDARD.decode(sent).unwrap(), content);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_backoff_grows_per_attempt() {
        let store = ScriptedStore::new(
            vec![],
            vec![
                Err(RemoteError::Conflict),
                Err(RemoteError::Conflict),
                Err(RemoteError::Conflict),
            ],
        );
        let publisher = Publisher::new(store.clone(), &PublishConfig::default());

        let start = Instant::now();
        let err = publisher.publish(&target(), b"Hello").await.unwrap_err();

        // 1s after the first conflict, 2s after the second, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(matches!(err, PublishError::Conflict { attempts: 3 }));
        assert_eq!(store.read_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_retry_waits_between_attempts() {
        let store = ScriptedStore::new(
            vec![
                Err(RemoteError::Transport("reset".into())),
                Err(RemoteError::Api {
                    status: 502,
                    message: "bad gateway".into(),
                }),
                marker("v1"),
            ],
            vec![Ok(commit("c8"))],
        );
        let publisher = Publisher::new(store.clone(), &PublishConfig::default());

        let start = Instant::now();
        publisher.publish(&target(), b"Hello").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));

        let times = store.read_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_backoff_does_not_sleep() {
        let store = ScriptedStore::new(vec![], vec![Err(RemoteError::Conflict), Ok(commit("c9"))]);
        let start = Instant::now();
        publisher(store, true)
            .publish(&target(), b"Hello")
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_commit_message_has_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(commit_message(now), "Update wiki - 2026-01-02T03:04:05.000Z");
    }
}
