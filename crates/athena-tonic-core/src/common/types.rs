//! # Shared Batch Types and Defaults
//!
//! This module defines the values that flow between the batcher and the
//! stream driver, together with the defaults both sides agree on.
//!
//! ## Types
//!
//! - [`ClassificationItem`] - one wire-ready item (the schema's
//!   `ClassificationInput`). Produced by a transform stage and treated as
//!   opaque and immutable by the batcher.
//! - [`Batch`] - a deployment id plus at most `max_batch_size` items. An empty
//!   batch is a keepalive.
//!
//! ## Constants
//!
//! - [`DEFAULT_MAX_BATCH_SIZE`], [`DEFAULT_BATCH_TIMEOUT`],
//!   [`DEFAULT_KEEPALIVE_INTERVAL`] - batch assembly limits.
//! - [`DEFAULT_IDLE_TIMEOUT`] - stream idle cutoff.
//! - [`DEFAULT_MAX_MESSAGE_SIZE`] - decoded message limit for responses.

use crate::proto::{ClassificationInput, ClassifyRequest};
use core::time::Duration;

/// A single item ready to be sent for classification.
pub type ClassificationItem = ClassificationInput;

/// Maximum number of items per wire batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

/// How long to wait for one more item once a batch holds at least one.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// How long to wait with an empty batch before sending a keepalive.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Idle cutoff measured from the last received response.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Largest response message the client will decode (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// An ordered group of items bound for one deployment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub deployment_id: String,
    pub items: Vec<ClassificationItem>,
}

impl Batch {
    pub fn new(deployment_id: impl Into<String>, items: Vec<ClassificationItem>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            items,
        }
    }

    /// An empty batch used to keep an idle stream alive.
    pub fn keepalive(deployment_id: impl Into<String>) -> Self {
        Self::new(deployment_id, Vec::new())
    }

    pub fn is_keepalive(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Correlation ids of the items, in batch order.
    pub fn correlation_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.correlation_id.as_str())
    }
}

impl From<Batch> for ClassifyRequest {
    fn from(batch: Batch) -> Self {
        Self {
            deployment_id: batch.deployment_id,
            inputs: batch.items,
        }
    }
}

impl From<ClassifyRequest> for Batch {
    fn from(request: ClassifyRequest) -> Self {
        Self {
            deployment_id: request.deployment_id,
            items: request.inputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> ClassificationItem {
        ClassificationItem {
            correlation_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_batch_is_keepalive() {
        let batch = Batch::keepalive("dep");
        assert!(batch.is_keepalive());
        assert_eq!(batch.deployment_id, "dep");
    }

    #[test]
    fn batch_converts_to_request_preserving_order() {
        let batch = Batch::new("dep", vec![item("a"), item("b")]);
        assert_eq!(batch.correlation_ids().collect::<Vec<_>>(), ["a", "b"]);

        let request = ClassifyRequest::from(batch);
        assert_eq!(request.deployment_id, "dep");
        assert_eq!(request.inputs[0].correlation_id, "a");
        assert_eq!(request.inputs[1].correlation_id, "b");
    }
}
