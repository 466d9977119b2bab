//! `ChannelPlugin` implementation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    magpie_channels::{
        plugin::{
            ChannelEventSink, ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin,
            ChannelStatus, ReplyDispatcher,
        },
        session::SessionRouter,
        store::PairingStore,
    },
    tracing::{error, info},
};

use crate::{
    client::LarkClient,
    config::LarkAccountConfig,
    handlers::EventPipeline,
    outbound::LarkOutbound,
    state::{AccountRuntime, LarkState},
    transport::{EventHandler, EventTransport},
    CHANNEL,
};

pub struct LarkPlugin {
    state: LarkState,
    store: Arc<dyn PairingStore>,
    router: Arc<dyn SessionRouter>,
    sink: Arc<dyn ChannelEventSink>,
    dispatcher: Arc<dyn ReplyDispatcher>,
    /// Transports registered per account before `start_account`. Accounts
    /// without one are passive: the host feeds events through [`Self::handler`].
    transports: Mutex<HashMap<String, Arc<dyn EventTransport>>>,
    outbound: LarkOutbound,
    status: LarkStatus,
}

impl LarkPlugin {
    #[must_use]
    pub fn new(
        store: Arc<dyn PairingStore>,
        router: Arc<dyn SessionRouter>,
        sink: Arc<dyn ChannelEventSink>,
        dispatcher: Arc<dyn ReplyDispatcher>,
    ) -> Self {
        let state = LarkState::new();
        Self {
            store,
            router,
            sink,
            dispatcher,
            transports: Mutex::new(HashMap::new()),
            outbound: LarkOutbound::new(state.clone()),
            status: LarkStatus {
                state: state.clone(),
            },
            state,
        }
    }

    /// Register the live-connection transport for an account. Must happen
    /// before `start_account`.
    pub fn set_transport(&self, account_id: &str, transport: Arc<dyn EventTransport>) {
        let mut transports = self.transports.lock().unwrap_or_else(|e| e.into_inner());
        transports.insert(account_id.to_string(), transport);
    }

    /// Event handler for an account, for hosts that receive platform
    /// callbacks through their own endpoint and push raw events in directly.
    #[must_use]
    pub fn handler(&self, account_id: &str) -> Arc<dyn EventHandler> {
        Arc::new(EventPipeline::new(
            account_id,
            self.state.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.router),
            Arc::clone(&self.sink),
            Arc::clone(&self.dispatcher),
        ))
    }

    fn build_client(config: &LarkAccountConfig) -> LarkClient {
        match &config.api_base_url {
            Some(base) => {
                LarkClient::with_base_url(&config.app_id, config.app_secret.clone(), base)
            },
            None => LarkClient::new(&config.app_id, config.app_secret.clone()),
        }
    }
}

#[async_trait]
impl ChannelPlugin for LarkPlugin {
    fn id(&self) -> &str {
        CHANNEL
    }

    fn name(&self) -> &str {
        "Lark"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let config: LarkAccountConfig =
            serde_json::from_value(config).context("invalid lark account config")?;
        config.validate()?;

        let client = Arc::new(Self::build_client(&config));
        let bot = client
            .bot_info()
            .await
            .context("failed to fetch lark bot identity")?;

        let runtime = AccountRuntime::new(config, client, bot);
        runtime.set_connected(true);
        let cancel = runtime.cancel.clone();
        self.state.insert(account_id, runtime.clone());
        info!(account_id, bot = ?runtime.bot.name, "lark account started");

        let transport = {
            let transports = self.transports.lock().unwrap_or_else(|e| e.into_inner());
            transports.get(account_id).cloned()
        };
        if let Some(transport) = transport {
            let handler = self.handler(account_id);
            let sink = Arc::clone(&self.sink);
            let state = self.state.clone();
            let account = account_id.to_string();
            tokio::spawn(async move {
                let result = transport.run(handler, cancel).await;
                if let Some(runtime) = state.get(&account) {
                    runtime.set_connected(false);
                }
                if let Err(connection_error) = result {
                    error!(account_id = %account, error = %connection_error, "lark connection died");
                    sink.emit(magpie_channels::plugin::ChannelEvent::AccountDisabled {
                        channel_type: CHANNEL.to_string(),
                        account_id: account,
                        reason: connection_error.to_string(),
                    })
                    .await;
                }
            });
        }
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        if self.state.remove(account_id) {
            info!(account_id, "lark account stopped");
        }
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(&self.status)
    }
}

struct LarkStatus {
    state: LarkState,
}

#[async_trait]
impl ChannelStatus for LarkStatus {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        match self.state.get(account_id) {
            Some(runtime) => Ok(ChannelHealthSnapshot {
                connected: runtime.is_connected(),
                account_id: account_id.to_string(),
                details: runtime.bot.name.clone(),
            }),
            None => Ok(ChannelHealthSnapshot {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("not running".to_string()),
            }),
        }
    }
}
