//! Per-account runtime state.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use tokio_util::sync::CancellationToken;

use crate::{client::LarkClient, config::LarkAccountConfig, mention::BotIdentity};

/// Everything one running account carries. Cloning is cheap; the config is
/// an immutable snapshot and a hot-reload replaces the whole runtime.
#[derive(Clone)]
pub struct AccountRuntime {
    pub config: Arc<LarkAccountConfig>,
    pub client: Arc<LarkClient>,
    pub bot: BotIdentity,
    pub cancel: CancellationToken,
    connected: Arc<AtomicBool>,
}

impl AccountRuntime {
    #[must_use]
    pub fn new(config: LarkAccountConfig, client: Arc<LarkClient>, bot: BotIdentity) -> Self {
        Self {
            config: Arc::new(config),
            client,
            bot,
            cancel: CancellationToken::new(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Shared map of running accounts. Read per event under a short lock; never
/// held across await points.
#[derive(Clone, Default)]
pub struct LarkState {
    accounts: Arc<RwLock<HashMap<String, AccountRuntime>>>,
}

impl LarkState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) an account runtime. A replaced runtime's
    /// connection is cancelled.
    pub fn insert(&self, account_id: &str, runtime: AccountRuntime) {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = accounts.insert(account_id.to_string(), runtime) {
            previous.cancel.cancel();
        }
    }

    /// Remove an account, cancelling its connection. Returns false when the
    /// account was not running.
    pub fn remove(&self, account_id: &str) -> bool {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        match accounts.remove(account_id) {
            Some(runtime) => {
                runtime.cancel.cancel();
                true
            },
            None => false,
        }
    }

    /// Snapshot of one account's runtime for the duration of an event.
    #[must_use]
    pub fn get(&self, account_id: &str) -> Option<AccountRuntime> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(account_id).cloned()
    }

    #[must_use]
    pub fn account_ids(&self) -> Vec<String> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.keys().cloned().collect()
    }
}
