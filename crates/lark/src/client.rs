//! Minimal Lark Open API client: tenant token management, message send,
//! and the bot-info probe. Only the endpoints the plugin needs.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::json,
};

use crate::{error::Error, mention::BotIdentity, Result};

const DEFAULT_BASE_URL: &str = "https://open.larksuite.com/open-apis";

/// Renew the cached tenant token this long before its reported expiry.
const TOKEN_RENEWAL_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct LarkClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: Secret<String>,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T> {
        if self.code != 0 {
            return Err(Error::api(self.code, self.msg));
        }
        self.data
            .ok_or_else(|| Error::message("lark api response missing data"))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    /// Remaining validity in seconds.
    #[serde(default)]
    expire: u64,
}

#[derive(Deserialize)]
struct BotInfo {
    #[serde(default)]
    open_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    app_name: Option<String>,
}

#[derive(Deserialize)]
struct BotInfoResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    bot: Option<BotInfo>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: String,
}

impl LarkClient {
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_secret: Secret<String>) -> Self {
        Self::with_base_url(app_id, app_secret, DEFAULT_BASE_URL)
    }

    /// Point the client at a different API host (test servers).
    #[must_use]
    pub fn with_base_url(
        app_id: impl Into<String>,
        app_secret: Secret<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret,
            token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|t| Instant::now() < t.expires_at)
            .map(|t| t.value.clone())
    }

    fn store_token(&self, value: String, expire_secs: u64) {
        let ttl = Duration::from_secs(expire_secs).saturating_sub(TOKEN_RENEWAL_MARGIN);
        let mut guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(CachedToken {
            value,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Fetch (or reuse) the tenant access token for API calls.
    pub async fn tenant_access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        let url = format!("{}/auth/v3/tenant_access_token/internal", self.base_url);
        let response: TokenResponse = self
            .http
            .post(&url)
            .json(&json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret.expose_secret(),
            }))
            .send()
            .await?
            .json()
            .await?;
        if response.code != 0 {
            return Err(Error::api(response.code, response.msg));
        }
        self.store_token(response.tenant_access_token.clone(), response.expire);
        Ok(response.tenant_access_token)
    }

    /// Identity of the bot itself, used for mention matching.
    pub async fn bot_info(&self) -> Result<BotIdentity> {
        let token = self.tenant_access_token().await?;
        let url = format!("{}/bot/v3/info", self.base_url);
        let response: BotInfoResponse = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?;
        if response.code != 0 {
            return Err(Error::api(response.code, response.msg));
        }
        let bot = response
            .bot
            .ok_or_else(|| Error::message("bot info response missing bot"))?;
        Ok(BotIdentity {
            open_id: bot.open_id,
            user_id: bot.user_id,
            name: bot.app_name,
        })
    }

    /// Send a text message. `reply_to` threads the message under an existing
    /// one via the reply endpoint; otherwise the conversation is addressed
    /// directly. Returns the platform message id.
    pub async fn send_text(
        &self,
        receive_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String> {
        let token = self.tenant_access_token().await?;
        let content = json!({ "text": text }).to_string();

        let request = match reply_to {
            Some(parent_id) => {
                let url = format!("{}/im/v1/messages/{parent_id}/reply", self.base_url);
                self.http.post(&url).json(&json!({
                    "msg_type": "text",
                    "content": content,
                }))
            },
            None => {
                let url = format!(
                    "{}/im/v1/messages?receive_id_type={}",
                    self.base_url,
                    receive_id_type(receive_id)
                );
                self.http.post(&url).json(&json!({
                    "receive_id": receive_id,
                    "msg_type": "text",
                    "content": content,
                }))
            },
        };

        let envelope: ApiEnvelope<SentMessage> =
            request.bearer_auth(token).send().await?.json().await?;
        Ok(envelope.into_data()?.message_id)
    }
}

/// Lark addresses chats and users through different id namespaces; the prefix
/// tells them apart.
fn receive_id_type(receive_id: &str) -> &'static str {
    if receive_id.starts_with("oc_") {
        "chat_id"
    } else {
        "open_id"
    }
}
