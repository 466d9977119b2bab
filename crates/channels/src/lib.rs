//! Channel plugin system.
//!
//! Each channel (Lark, and whatever comes next) implements the
//! [`plugin::ChannelPlugin`] trait with sub-traits for inbound/outbound
//! messaging, status, and gateway lifecycle. This crate also carries the
//! channel-agnostic policy primitives: allow-list matching, access policies,
//! the canonical [`plugin::RoutingContext`], and the session-routing and
//! pairing-store boundaries consumed by channel adapters.

pub mod error;
pub mod gating;
pub mod plugin;
pub mod registry;
pub mod session;
pub mod store;

pub use {
    error::{Error, Result},
    plugin::{
        ChannelEvent, ChannelEventSink, ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin,
        ChannelStatus, ReplyDelivery, ReplyDispatcher, RoutingContext,
    },
    session::{Peer, ResolvedRoute, SessionRouter},
    store::{PairingRequest, PairingStore},
};
