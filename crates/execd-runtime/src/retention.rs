//! Eviction of finished sessions and their capture files.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use execd_core::{RetentionSettings, SessionId};

use crate::engine::ExecutionEngine;
use crate::registry::{SessionRegistry, SessionRegistryExt};

/// Which finished sessions may be evicted.
///
/// Only sessions whose output was read after completion are candidates.
/// Running sessions are never evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Evict sessions finished longer ago than this
    pub max_age: Option<Duration>,
    /// Keep at most this many of the most recently finished sessions
    pub max_finished_sessions: Option<usize>,
}

impl From<&RetentionSettings> for RetentionPolicy {
    fn from(settings: &RetentionSettings) -> Self {
        Self {
            max_age: settings.max_age_secs.map(Duration::from_secs),
            max_finished_sessions: settings.max_finished_sessions,
        }
    }
}

impl RetentionPolicy {
    /// Whether the policy can ever evict anything.
    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some() || self.max_finished_sessions.is_some()
    }
}

impl ExecutionEngine {
    /// Evict sessions the policy allows, as of `now`.
    ///
    /// Returns the evicted session ids.
    pub fn sweep(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Vec<SessionId> {
        let mut candidates: Vec<(SessionId, DateTime<Utc>)> = self
            .registry()
            .session_ids()
            .into_iter()
            .filter_map(|id| {
                let finished = self
                    .registry()
                    .inspect(&id, |kernel| {
                        if kernel.is_running() || !kernel.is_consumed() {
                            None
                        } else {
                            kernel.finished_at()
                        }
                    })
                    .ok()
                    .flatten()?;
                Some((id, finished))
            })
            .collect();

        // Newest first, so the count limit keeps the head.
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let mut evicted = Vec::new();
        for (index, (id, finished)) in candidates.into_iter().enumerate() {
            let too_old = policy.max_age.is_some_and(|max_age| {
                (now - finished)
                    .to_std()
                    .map(|age| age > max_age)
                    .unwrap_or(false)
            });
            let over_count = policy
                .max_finished_sessions
                .is_some_and(|limit| index >= limit);

            if too_old || over_count {
                self.evict(&id);
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            info!("Retention sweep evicted {} session(s)", evicted.len());
        }
        evicted
    }

    fn evict(&self, session_id: &SessionId) {
        let Some(kernel) = self.registry().remove(session_id) else {
            return;
        };
        if let Err(e) = self.capture().remove(kernel.paths()) {
            warn!("Failed to delete capture files of {}: {}", session_id, e);
        }
        debug!("Evicted session: {}", session_id);
    }

    /// Run [`ExecutionEngine::sweep`] every `interval` until the task is aborted.
    pub fn spawn_retention_sweeper(
        &self,
        policy: RetentionPolicy,
        interval: Duration,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.sweep(&policy, Utc::now());
            }
        })
    }
}
