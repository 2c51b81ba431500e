//! Durable job queues with manual acknowledgement.
//!
//! One sled tree per queue. Keys are monotonic u64 ids (big-endian, so the
//! tree iterates in publish order); values are JSON envelopes carrying the
//! payload, a ready/in-flight state, and a delivery counter.
//!
//! Semantics are at-least-once: `claim` flips an envelope to in-flight with
//! a compare-and-swap (two competing consumers cannot claim the same
//! message), `ack` deletes it, `nack` returns it to ready, and
//! [`JobQueue::recover`] sweeps in-flight leftovers of a crashed consumer
//! back to ready on startup. Consumers therefore must be idempotent — which
//! the trainer's manifest CAS and the predictor's deterministic upsert are.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MessageState {
    Ready,
    Inflight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    state: MessageState,
    deliveries: u32,
    payload: serde_json::Value,
}

/// A claimed message. Hold it until the work is done, then `ack` or
/// `nack` it back to its queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: u64,
    pub deliveries: u32,
    payload: serde_json::Value,
}

impl Delivery {
    /// Deserialize the payload. A malformed payload is the caller's poison
    /// message to deal with (log + ack).
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[derive(Clone)]
pub struct JobQueue {
    name: String,
    db: sled::Db,
    tree: sled::Tree,
}

impl JobQueue {
    pub(crate) fn open(db: &sled::Db, name: &str) -> Result<Self, StoreError> {
        let tree = db.open_tree(format!("queue.{name}"))?;
        Ok(JobQueue {
            name: name.to_string(),
            db: db.clone(),
            tree,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a message. Durable once this returns.
    pub fn publish<T: Serialize>(&self, payload: &T) -> Result<u64, StoreError> {
        let id = self.db.generate_id()?;
        let envelope = Envelope {
            state: MessageState::Ready,
            deliveries: 0,
            payload: serde_json::to_value(payload)?,
        };
        self.tree
            .insert(id.to_be_bytes(), serde_json::to_vec(&envelope)?)?;
        self.tree.flush()?;
        Ok(id)
    }

    /// Claim up to `max` ready messages, oldest first, flipping each to
    /// in-flight. Returns fewer (possibly zero) when the queue is drained.
    pub fn claim(&self, max: usize) -> Result<Vec<Delivery>, StoreError> {
        let mut claimed = Vec::new();
        for entry in self.tree.iter() {
            if claimed.len() >= max {
                break;
            }
            let (key, value) = entry?;
            let envelope: Envelope = serde_json::from_slice(&value)?;
            if envelope.state != MessageState::Ready {
                continue;
            }
            let mut inflight = envelope.clone();
            inflight.state = MessageState::Inflight;
            inflight.deliveries = envelope.deliveries + 1;
            let swapped = self.tree.compare_and_swap(
                &key,
                Some(value),
                Some(serde_json::to_vec(&inflight)?),
            )?;
            if swapped.is_err() {
                continue; // another consumer got there first
            }
            let mut id_bytes = [0u8; 8];
            id_bytes.copy_from_slice(&key);
            claimed.push(Delivery {
                id: u64::from_be_bytes(id_bytes),
                deliveries: inflight.deliveries,
                payload: inflight.payload,
            });
        }
        Ok(claimed)
    }

    /// Acknowledge: the message is done and forgotten.
    pub fn ack(&self, delivery: &Delivery) -> Result<(), StoreError> {
        self.tree.remove(delivery.id.to_be_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    /// Negative acknowledgement: return the message to ready for
    /// redelivery.
    pub fn nack(&self, delivery: &Delivery) -> Result<(), StoreError> {
        let key = delivery.id.to_be_bytes();
        if let Some(value) = self.tree.get(key)? {
            let mut envelope: Envelope = serde_json::from_slice(&value)?;
            envelope.state = MessageState::Ready;
            self.tree.insert(key, serde_json::to_vec(&envelope)?)?;
            self.tree.flush()?;
        }
        Ok(())
    }

    /// Return crashed-consumer leftovers to ready. Call once on startup,
    /// before the first claim.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let mut recovered = 0;
        for entry in self.tree.iter() {
            let (key, value) = entry?;
            let mut envelope: Envelope = serde_json::from_slice(&value)?;
            if envelope.state == MessageState::Inflight {
                envelope.state = MessageState::Ready;
                self.tree.insert(key, serde_json::to_vec(&envelope)?)?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(queue = %self.name, recovered, "requeued in-flight messages");
        }
        Ok(recovered)
    }

    /// Messages currently in the tree, whatever their state.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn open_queue(dir: &std::path::Path) -> JobQueue {
        let db = sled::open(dir).unwrap();
        JobQueue::open(&db, "test").unwrap()
    }

    #[test]
    fn publish_claim_ack_drains_in_order() {
        let dir = tempdir().unwrap();
        let queue = open_queue(dir.path());
        queue.publish(&json!({"n": 1})).unwrap();
        queue.publish(&json!({"n": 2})).unwrap();
        queue.publish(&json!({"n": 3})).unwrap();

        let first = queue.claim(2).unwrap();
        assert_eq!(first.len(), 2);
        let values: Vec<i64> = first
            .iter()
            .map(|d| d.parse::<serde_json::Value>().unwrap()["n"].as_i64().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2]);

        // In-flight messages are not claimable again.
        assert_eq!(queue.claim(10).unwrap().len(), 1);

        for delivery in &first {
            queue.ack(delivery).unwrap();
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn nack_makes_message_claimable_again() {
        let dir = tempdir().unwrap();
        let queue = open_queue(dir.path());
        queue.publish(&json!({"job": "a"})).unwrap();

        let delivery = queue.claim(1).unwrap().pop().unwrap();
        assert_eq!(delivery.deliveries, 1);
        assert!(queue.claim(1).unwrap().is_empty());

        queue.nack(&delivery).unwrap();
        let redelivered = queue.claim(1).unwrap().pop().unwrap();
        assert_eq!(redelivered.id, delivery.id);
        assert_eq!(redelivered.deliveries, 2);
    }

    #[test]
    fn recover_requeues_stale_inflight() {
        let dir = tempdir().unwrap();
        let queue = open_queue(dir.path());
        queue.publish(&json!({"job": "a"})).unwrap();
        let _abandoned = queue.claim(1).unwrap();

        // Simulates a consumer that died mid-job.
        assert_eq!(queue.recover().unwrap(), 1);
        assert_eq!(queue.claim(1).unwrap().len(), 1);
    }

    #[test]
    fn queues_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let queue = open_queue(dir.path());
            queue.publish(&json!({"job": "persists"})).unwrap();
        }
        let queue = open_queue(dir.path());
        assert_eq!(queue.len(), 1);
        let delivery = queue.claim(1).unwrap().pop().unwrap();
        let value: serde_json::Value = delivery.parse().unwrap();
        assert_eq!(value["job"], "persists");
    }
}
