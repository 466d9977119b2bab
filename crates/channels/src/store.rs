//! Pairing-store boundary.
//!
//! Under a `pairing` DM policy, unknown senders are issued a human-readable
//! code and wait for operator approval. The store owns the pending requests
//! and the approved allow-list entries; channel adapters only consume this
//! boundary.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use {anyhow::Result, async_trait::async_trait, rand::Rng};

/// How long a pairing request stays valid before a new code may be issued.
const PAIRING_TTL: Duration = Duration::from_secs(3600);

/// Outcome of a create-or-fetch on the pairing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    /// Human-presentable pairing code.
    pub code: String,
    /// True only the first time this `(channel, sender)` requested pairing
    /// within the code's validity window.
    pub created: bool,
}

/// Persistent pairing/approval storage consumed by channel adapters.
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Identifiers approved via pairing for the given channel.
    async fn read_allow_from(&self, channel: &str) -> Result<Vec<String>>;

    /// Idempotently create (or fetch) the pending pairing request for
    /// `(channel, sender_id)`.
    async fn upsert_pairing_request(&self, channel: &str, sender_id: &str)
        -> Result<PairingRequest>;
}

struct Pending {
    code: String,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryState {
    /// Pending requests keyed by `(channel, sender)`.
    pending: HashMap<(String, String), Pending>,
    /// Approved sender ids per channel.
    approved: HashMap<String, Vec<String>>,
}

/// In-memory pairing store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryPairingStore {
    state: Mutex<MemoryState>,
}

impl MemoryPairingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve a pending request, moving the sender onto the allow-list.
    /// Returns false when no pending request exists.
    pub fn approve(&self, channel: &str, sender_id: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let key = (channel.to_string(), sender_id.to_string());
        if state.pending.remove(&key).is_none() {
            return false;
        }
        state
            .approved
            .entry(channel.to_string())
            .or_default()
            .push(sender_id.to_string());
        true
    }

    /// Pending (non-expired) sender ids for a channel, for an admin surface.
    pub fn list_pending(&self, channel: &str) -> Vec<String> {
        let now = Instant::now();
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .pending
            .iter()
            .filter(|((ch, _), pending)| ch == channel && now < pending.expires_at)
            .map(|((_, sender), _)| sender.clone())
            .collect()
    }
}

#[async_trait]
impl PairingStore for MemoryPairingStore {
    async fn read_allow_from(&self, channel: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.approved.get(channel).cloned().unwrap_or_default())
    }

    async fn upsert_pairing_request(
        &self,
        channel: &str,
        sender_id: &str,
    ) -> Result<PairingRequest> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let key = (channel.to_string(), sender_id.to_string());

        if let Some(existing) = state.pending.get(&key) {
            if now < existing.expires_at {
                return Ok(PairingRequest {
                    code: existing.code.clone(),
                    created: false,
                });
            }
            // Expired — issue a fresh code below.
            state.pending.remove(&key);
        }

        let code = generate_pairing_code();
        state.pending.insert(key, Pending {
            code: code.clone(),
            expires_at: now + PAIRING_TTL,
        });
        Ok(PairingRequest {
            code,
            created: true,
        })
    }
}

/// Generate a random 6-digit pairing code.
fn generate_pairing_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}
