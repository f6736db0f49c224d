use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Delivery policy for one durable consumer
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ConsumerPolicy {
    /// Messages processed concurrently by the pool
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Deliveries before the transport abandons a message
    #[serde(default = "default_max_deliver")]
    pub max_deliver: u32,
}

impl Default for ConsumerPolicy {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_deliver: default_max_deliver(),
        }
    }
}

/// One pool per source
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConsumerPolicies {
    // Replicated key-value bucket watcher
    #[serde(default)]
    pub key_watch: ConsumerPolicy,

    // Write-ahead-log change stream
    #[serde(default)]
    pub log_change: ConsumerPolicy,

    // Table change stream
    #[serde(default)]
    pub table_stream: ConsumerPolicy,
}

impl Default for ConsumerPolicies {
    fn default() -> Self {
        Self {
            key_watch: ConsumerPolicy {
                max_in_flight: 1000,
                max_deliver: 3,
            },
            log_change: ConsumerPolicy {
                max_in_flight: 100,
                max_deliver: 3,
            },
            table_stream: ConsumerPolicy {
                max_in_flight: 100,
                max_deliver: 3,
            },
        }
    }
}

impl ConsumerPolicies {
    pub fn validate(&self) -> Result<()> {
        for (name, policy) in [
            ("key_watch", &self.key_watch),
            ("log_change", &self.log_change),
            ("table_stream", &self.table_stream),
        ] {
            if policy.max_in_flight == 0 {
                return Err(invalid(format!(
                    "consumer.{name}.max_in_flight must be at least 1"
                )));
            }
            if policy.max_deliver == 0 {
                return Err(invalid(format!(
                    "consumer.{name}.max_deliver must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

fn default_max_in_flight() -> usize {
    100
}
fn default_max_deliver() -> u32 {
    3
}
