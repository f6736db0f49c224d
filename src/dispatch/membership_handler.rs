use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::HandlerOutcome;
use super::RecordHandler;
use crate::Document;
use crate::KvBucket;
use crate::ListMutator;
use crate::MembershipConfig;
use crate::Result;

/// Keeps `{list_prefix}{owner}` lists in step with member records.
///
/// Each record names its owner and itself; a flagged or deleted record
/// removes itself from the owner's list. Mutations are detached, so the
/// handler always reports [`HandlerOutcome::Done`].
pub struct MembershipHandler<B: KvBucket> {
    lists: ListMutator<B>,
    list_prefix: String,
    owner_field: String,
    member_field: String,
    deleted_field: String,
}

impl<B: KvBucket> MembershipHandler<B> {
    pub fn new(
        lists: ListMutator<B>,
        config: &MembershipConfig,
    ) -> Self {
        Self {
            lists,
            list_prefix: config.list_prefix.clone(),
            owner_field: config.owner_field.clone(),
            member_field: config.member_field.clone(),
            deleted_field: config.deleted_field.clone(),
        }
    }

    pub fn list_key(
        &self,
        owner: &str,
    ) -> String {
        format!("{}{}", self.list_prefix, owner)
    }

    fn target(
        &self,
        key: &str,
        payload: &Document,
    ) -> Option<(String, String)> {
        let Some(owner) = payload.get_id(&self.owner_field) else {
            warn!(key, field = %self.owner_field, "member record has no owner, skipping");
            return None;
        };
        let Some(member) = payload.get_id(&self.member_field) else {
            warn!(key, field = %self.member_field, "member record has no identifier, skipping");
            return None;
        };
        Some((self.list_key(&owner), member))
    }

    fn is_flagged(
        &self,
        payload: &Document,
    ) -> bool {
        payload.get(&self.deleted_field).and_then(Value::as_bool) == Some(true) || payload.is_deletion_marked()
    }
}

#[async_trait]
impl<B: KvBucket> RecordHandler for MembershipHandler<B> {
    async fn handle_upsert(
        &self,
        key: &str,
        payload: &Document,
    ) -> Result<HandlerOutcome> {
        if let Some((list_key, member)) = self.target(key, payload) {
            let remove = self.is_flagged(payload);
            self.lists.spawn_mutation(list_key, member, remove);
        }
        Ok(HandlerOutcome::Done)
    }

    async fn handle_delete(
        &self,
        key: &str,
        payload: Option<&Document>,
    ) -> Result<HandlerOutcome> {
        let Some(payload) = payload else {
            debug!(key, "member removed without a payload, list left as is");
            return Ok(HandlerOutcome::Done);
        };
        if let Some((list_key, member)) = self.target(key, payload) {
            self.lists.spawn_mutation(list_key, member, true);
        }
        Ok(HandlerOutcome::Done)
    }
}
