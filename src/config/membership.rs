use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::require_non_empty;
use crate::Result;

/// Membership list maintenance (alternate emails per merged user by default)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MembershipConfig {
    /// Key prefix of the v1 records that feed the list
    #[serde(default = "default_source_prefix")]
    pub source_prefix: String,

    /// Key prefix of the membership lists in the mappings bucket
    #[serde(default = "default_list_prefix")]
    pub list_prefix: String,

    /// Record field naming the list owner
    #[serde(default = "default_owner_field")]
    pub owner_field: String,

    /// Record field naming the member
    #[serde(default = "default_member_field")]
    pub member_field: String,

    /// Boolean record field that removes the member when true
    #[serde(default = "default_deleted_field")]
    pub deleted_field: String,

    /// Read-modify-write attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Upper bound of the random delay before each attempt (unit: milliseconds)
    #[serde(default = "default_max_splay_ms")]
    pub max_splay_ms: u64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            source_prefix: default_source_prefix(),
            list_prefix: default_list_prefix(),
            owner_field: default_owner_field(),
            member_field: default_member_field(),
            deleted_field: default_deleted_field(),
            max_attempts: default_max_attempts(),
            max_splay_ms: default_max_splay_ms(),
        }
    }
}

impl MembershipConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.source_prefix, "membership.source_prefix")?;
        require_non_empty(&self.list_prefix, "membership.list_prefix")?;
        require_non_empty(&self.owner_field, "membership.owner_field")?;
        require_non_empty(&self.member_field, "membership.member_field")?;
        if self.max_attempts == 0 {
            return Err(invalid(
                "membership.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_splay(&self) -> Duration {
        Duration::from_millis(self.max_splay_ms)
    }
}

fn default_source_prefix() -> String {
    "salesforce-alternate_email__c".to_string()
}
fn default_list_prefix() -> String {
    "v1-merged-user.alternate-emails.".to_string()
}
fn default_owner_field() -> String {
    "leadorcontactid".to_string()
}
fn default_member_field() -> String {
    "sfid".to_string()
}
fn default_deleted_field() -> String {
    "isdeleted".to_string()
}
fn default_max_attempts() -> usize {
    5
}
fn default_max_splay_ms() -> u64 {
    1000
}
