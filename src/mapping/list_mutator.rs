use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;

use crate::async_task::spawn_task;
use crate::async_task::task_with_random_splay;
use crate::Error;
use crate::KvBucket;
use crate::MembershipConfig;
use crate::Result;
use crate::StorageError;
use crate::WriteOutcome;

/// Retry policy for [`ListMutator::mutate_with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationPolicy {
    pub max_attempts: usize,
    /// Random delay in `[0, max_splay)` before every attempt
    pub max_splay: Duration,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_splay: Duration::from_secs(1),
        }
    }
}

impl From<&MembershipConfig> for MutationPolicy {
    fn from(config: &MembershipConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            max_splay: config.max_splay(),
        }
    }
}

/// Adds `member` when absent, or removes its first occurrence.
/// Returns whether the list changed.
pub fn apply_membership(
    members: &mut Vec<String>,
    member: &str,
    remove: bool,
) -> bool {
    let position = members.iter().position(|m| m == member);
    match (position, remove) {
        (None, false) => {
            members.push(member.to_string());
            true
        }
        (Some(index), true) => {
            members.remove(index);
            true
        }
        _ => false,
    }
}

/// Read-modify-write of set-like JSON string arrays.
///
/// Every attempt re-reads the list; nothing is cached between attempts.
/// Writes are a conditional create when the list is absent and a
/// conditional update on the observed revision otherwise.
pub struct ListMutator<B: KvBucket> {
    bucket: Arc<B>,
    tracker: TaskTracker,
    policy: MutationPolicy,
}

impl<B: KvBucket> Clone for ListMutator<B> {
    fn clone(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            tracker: self.tracker.clone(),
            policy: self.policy,
        }
    }
}

impl<B: KvBucket> ListMutator<B> {
    pub fn new(
        bucket: Arc<B>,
        tracker: TaskTracker,
        policy: MutationPolicy,
    ) -> Self {
        Self {
            bucket,
            tracker,
            policy,
        }
    }

    /// Current members and revision; `None` when the list does not exist.
    pub async fn read_list(
        &self,
        list_key: &str,
    ) -> Result<Option<(Vec<String>, u64)>> {
        let Some(entry) = self.bucket.get(list_key).await? else {
            return Ok(None);
        };
        let members: Vec<String> =
            serde_json::from_slice(&entry.value).map_err(|e| StorageError::Decode {
                key: list_key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some((members, entry.revision)))
    }

    /// One read-modify-write attempt. A lost race is
    /// [`WriteOutcome::Conflict`]; the caller owns the retry loop.
    pub async fn mutate(
        &self,
        list_key: &str,
        member: &str,
        remove: bool,
    ) -> Result<WriteOutcome> {
        match self.try_mutate(list_key, member, remove).await {
            Err(e) if e.is_conflict() => {
                debug!(list_key, "membership write lost a race: {}", e);
                Ok(WriteOutcome::Conflict)
            }
            other => other,
        }
    }

    /// Retries conflicts with a random splay before every attempt.
    pub async fn mutate_with_retry(
        &self,
        list_key: &str,
        member: &str,
        remove: bool,
        policy: MutationPolicy,
    ) -> Result<WriteOutcome> {
        let attempt = || self.try_mutate(list_key, member, remove);
        match task_with_random_splay(attempt, policy.max_attempts, policy.max_splay, Error::is_conflict)
            .await
        {
            Err(e) if e.is_conflict() => Ok(WriteOutcome::Conflict),
            other => other,
        }
    }

    /// Best-effort detached mutation with the configured policy.
    /// Failures are logged.
    pub fn spawn_mutation(
        &self,
        list_key: String,
        member: String,
        remove: bool,
    ) {
        let mutator = self.clone();
        spawn_task(&self.tracker, "membership_mutation", move || async move {
            let outcome = mutator
                .mutate_with_retry(&list_key, &member, remove, mutator.policy)
                .await?;
            if outcome.needs_retry() {
                error!(
                    %list_key,
                    %member,
                    attempts = mutator.policy.max_attempts,
                    "membership update abandoned after repeated conflicts"
                );
            } else {
                debug!(%list_key, %member, remove, outcome = outcome.label(), "membership updated");
            }
            Ok(())
        });
    }

    async fn try_mutate(
        &self,
        list_key: &str,
        member: &str,
        remove: bool,
    ) -> Result<WriteOutcome> {
        let (mut members, revision) = self.read_list(list_key).await?.unwrap_or_default();
        let existed = revision != 0;

        if !apply_membership(&mut members, member, remove) && existed {
            return Ok(WriteOutcome::Unchanged);
        }

        let value = serde_json::to_vec(&members).map_err(|e| StorageError::Encode(e.to_string()))?;
        if existed {
            let revision = self.bucket.update(list_key, Bytes::from(value), revision).await?;
            Ok(WriteOutcome::Updated(revision))
        } else {
            let revision = self.bucket.create(list_key, Bytes::from(value)).await?;
            Ok(WriteOutcome::Created(revision))
        }
    }
}
