//! Lark/Feishu channel plugin for magpie.
//!
//! Implements `ChannelPlugin` over the Lark Open API. The interesting part is
//! the inbound authorization pipeline in [`handlers`]: every event passes an
//! ordered sequence of policy gates (bot filter, group policy, DM policy with
//! pairing, command authorization, mention gating) before it is converted into
//! a canonical [`magpie_channels::RoutingContext`] and handed to the reply
//! dispatcher.

pub mod access;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod handlers;
pub mod mention;
pub mod outbound;
pub mod pairing;
pub mod plugin;
pub mod state;
pub mod transport;
pub mod webhook;

pub use {
    config::LarkAccountConfig,
    error::{Error, Result},
    plugin::LarkPlugin,
};

/// Channel tag used in session keys, events, and qualified sender ids.
pub const CHANNEL: &str = "lark";
