use {
    async_trait::async_trait,
    magpie_common::types::ChatType,
    std::{collections::HashMap, sync::Mutex},
};

/// The conversation endpoint a session is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub kind: ChatType,
    pub id: String,
}

impl Peer {
    #[must_use]
    pub fn direct(id: impl Into<String>) -> Self {
        Self {
            kind: ChatType::Direct,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            kind: ChatType::Group,
            id: id.into(),
        }
    }
}

/// Resolved route: which agent handles this message and under which session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub agent_id: String,
    pub session_key: String,
    pub account_id: String,
}

/// Metadata recorded against a session from an inbound message; consumed by
/// the session store for bookkeeping only, never read back on the reply path.
#[derive(Debug, Clone)]
pub struct InboundSessionMeta {
    pub channel: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub message_id: String,
    pub received_at: i64,
}

/// Session/routing resolver boundary consumed by channel adapters.
///
/// `resolve_route` must be deterministic: two calls with identical
/// `(channel, account_id, peer)` yield the same session key.
#[async_trait]
pub trait SessionRouter: Send + Sync {
    fn resolve_route(&self, channel: &str, account_id: &str, peer: &Peer) -> ResolvedRoute;

    /// Unix seconds of the session's last recorded activity, if any.
    async fn session_updated_at(&self, session_key: &str) -> Option<i64>;

    /// Record metadata from an inbound message. Failures are the caller's to
    /// log; they must never propagate into the reply path.
    async fn record_inbound_meta(
        &self,
        session_key: &str,
        meta: InboundSessionMeta,
    ) -> anyhow::Result<()>;

    /// Record the time a reply was delivered for a session.
    async fn record_outbound_at(&self, session_key: &str, sent_at: i64);
}

/// Default router: session keys derived purely from the peer descriptor, with
/// in-memory activity bookkeeping. Suitable for tests and single-process
/// deployments without a persistent session store.
#[derive(Default)]
pub struct StaticSessionRouter {
    updated: Mutex<HashMap<String, i64>>,
}

impl StaticSessionRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRouter for StaticSessionRouter {
    fn resolve_route(&self, channel: &str, account_id: &str, peer: &Peer) -> ResolvedRoute {
        ResolvedRoute {
            agent_id: "default".to_string(),
            session_key: format!("{channel}:{account_id}:{}:{}", peer.kind.as_str(), peer.id),
            account_id: account_id.to_string(),
        }
    }

    async fn session_updated_at(&self, session_key: &str) -> Option<i64> {
        let updated = self.updated.lock().unwrap_or_else(|e| e.into_inner());
        updated.get(session_key).copied()
    }

    async fn record_inbound_meta(
        &self,
        session_key: &str,
        meta: InboundSessionMeta,
    ) -> anyhow::Result<()> {
        let mut updated = self.updated.lock().unwrap_or_else(|e| e.into_inner());
        updated.insert(session_key.to_string(), meta.received_at);
        Ok(())
    }

    async fn record_outbound_at(&self, session_key: &str, sent_at: i64) {
        let mut updated = self.updated.lock().unwrap_or_else(|e| e.into_inner());
        updated.insert(session_key.to_string(), sent_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_is_deterministic() {
        let router = StaticSessionRouter::new();
        let a = router.resolve_route("lark", "acct", &Peer::direct("ou_1"));
        let b = router.resolve_route("lark", "acct", &Peer::direct("ou_1"));
        assert_eq!(a, b);
        assert_eq!(a.session_key, "lark:acct:direct:ou_1");
    }

    #[test]
    fn peers_are_usable_as_map_keys() {
        let mut routes: HashMap<Peer, String> = HashMap::new();
        routes.insert(Peer::direct("ou_1"), "a".into());
        routes.insert(Peer::group("ou_1"), "b".into());
        assert_eq!(routes.len(), 2);
        assert_eq!(routes.get(&Peer::direct("ou_1")).map(String::as_str), Some("a"));
    }

    #[test]
    fn group_and_direct_peers_get_distinct_sessions() {
        let router = StaticSessionRouter::new();
        let dm = router.resolve_route("lark", "acct", &Peer::direct("x"));
        let group = router.resolve_route("lark", "acct", &Peer::group("x"));
        assert_ne!(dm.session_key, group.session_key);
    }

    #[tokio::test]
    async fn activity_bookkeeping_roundtrip() {
        let router = StaticSessionRouter::new();
        let key = "lark:acct:direct:ou_1";
        assert_eq!(router.session_updated_at(key).await, None);

        let meta = InboundSessionMeta {
            channel: "lark".into(),
            sender_id: "ou_1".into(),
            sender_name: None,
            message_id: "om_1".into(),
            received_at: 1_700_000_000,
        };
        router.record_inbound_meta(key, meta).await.expect("record");
        assert_eq!(router.session_updated_at(key).await, Some(1_700_000_000));

        router.record_outbound_at(key, 1_700_000_100).await;
        assert_eq!(router.session_updated_at(key).await, Some(1_700_000_100));
    }
}
