use std::collections::HashMap;

use {
    magpie_channels::gating::{DmPolicy, GroupPolicy},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Per-group override. A `"*"` key in the group map acts as fallback for
/// groups without their own entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroupEntry {
    /// Explicit off-switch for this group; `None` means enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Second off-switch kept for config compatibility; either being `false`
    /// rejects the group regardless of policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,

    /// Overrides the account-level mention requirement for this group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_mention: Option<bool>,

    /// Member allow-list; when non-empty, only these senders pass.
    pub users: Vec<String>,

    /// System-prompt override carried into the routing context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl GroupEntry {
    /// True when either off-switch is explicitly set to false.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.enabled == Some(false) || self.allow == Some(false)
    }

    #[must_use]
    pub fn requires_mention(&self, account_default: bool) -> bool {
        self.require_mention.unwrap_or(account_default)
    }
}

/// Configuration for a single Lark bot account, resolved and merged by the
/// host's config layer. The pipeline treats one snapshot as immutable for the
/// duration of an event.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LarkAccountConfig {
    /// App ID from the Lark developer console.
    pub app_id: String,

    /// App secret from the Lark developer console.
    #[serde(serialize_with = "serialize_secret")]
    pub app_secret: Secret<String>,

    /// API host override. Feishu tenants use a different domain than
    /// international Lark; unset means the Lark default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// DM access policy.
    pub dm_policy: DmPolicy,

    /// Group access policy.
    pub group_policy: GroupPolicy,

    /// Whether group messages must mention the bot (account default;
    /// per-group entries may override).
    pub require_mention: bool,

    /// When mention detection is structurally impossible for a payload,
    /// treat the message as addressed instead of skipping it.
    pub mention_fail_open: bool,

    /// Process messages sent by other bots.
    pub allow_bots: bool,

    /// Sender allow-list for DMs (merged with pairing-store approvals).
    pub allowlist: Vec<String>,

    /// Per-group overrides keyed by chat id or group name. `None` means "no
    /// group allow-list configured", which is distinct from an empty map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<HashMap<String, GroupEntry>>,

    /// Require allow-list membership for control commands. When false,
    /// anyone who reached the command gate may issue commands.
    pub use_access_groups: bool,

    /// Allow `/`-prefixed control commands in message bodies at all.
    pub allow_text_commands: bool,
}

impl std::fmt::Debug for LarkAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LarkAccountConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("dm_policy", &self.dm_policy)
            .field("group_policy", &self.group_policy)
            .field("require_mention", &self.require_mention)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for LarkAccountConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: Secret::new(String::new()),
            api_base_url: None,
            dm_policy: DmPolicy::default(),
            group_policy: GroupPolicy::default(),
            require_mention: true,
            mention_fail_open: true,
            allow_bots: false,
            allowlist: Vec::new(),
            groups: None,
            use_access_groups: true,
            allow_text_commands: true,
        }
    }
}

impl LarkAccountConfig {
    /// Validate credentials before opening a connection. Failures here are
    /// fatal for this account's connection attempt.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_id.trim().is_empty() {
            anyhow::bail!("lark app_id is required");
        }
        if self.app_secret.expose_secret().trim().is_empty() {
            anyhow::bail!("lark app_secret is required");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = LarkAccountConfig::default();
        assert_eq!(cfg.dm_policy, DmPolicy::Pairing);
        assert_eq!(cfg.group_policy, GroupPolicy::Allowlist);
        assert!(cfg.require_mention);
        assert!(cfg.mention_fail_open);
        assert!(!cfg.allow_bots);
        assert!(cfg.groups.is_none());
        assert!(cfg.use_access_groups);
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{
            "app_id": "cli_123",
            "app_secret": "shh",
            "dm_policy": "open",
            "allowlist": ["ou_1", "user:ou_2"],
            "groups": {
                "oc_team": { "require_mention": false, "users": ["ou_1"] },
                "*": { "allow": false }
            }
        }"#;
        let cfg: LarkAccountConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(cfg.app_id, "cli_123");
        assert_eq!(cfg.app_secret.expose_secret(), "shh");
        assert_eq!(cfg.dm_policy, DmPolicy::Open);
        // defaults for unspecified fields
        assert_eq!(cfg.group_policy, GroupPolicy::Allowlist);
        assert!(cfg.require_mention);

        let groups = cfg.groups.expect("groups configured");
        let team = groups.get("oc_team").expect("entry");
        assert_eq!(team.require_mention, Some(false));
        assert_eq!(team.users, vec!["ou_1"]);
        assert!(groups.get("*").expect("wildcard").is_blocked());
    }

    #[test]
    fn serialize_roundtrip() {
        let cfg = LarkAccountConfig {
            app_id: "cli_x".into(),
            app_secret: Secret::new("tok".into()),
            dm_policy: DmPolicy::Disabled,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        let cfg2: LarkAccountConfig = serde_json::from_str(&json).expect("reparse");
        assert_eq!(cfg2.dm_policy, DmPolicy::Disabled);
        assert_eq!(cfg2.app_secret.expose_secret(), "tok");
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = LarkAccountConfig {
            app_secret: Secret::new("super-secret".into()),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(LarkAccountConfig::default().validate().is_err());
        let cfg = LarkAccountConfig {
            app_id: "cli_x".into(),
            app_secret: Secret::new("s".into()),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn group_entry_mention_override() {
        let entry = GroupEntry {
            require_mention: Some(false),
            ..Default::default()
        };
        assert!(!entry.requires_mention(true));
        let plain = GroupEntry::default();
        assert!(plain.requires_mention(true));
        assert!(!plain.requires_mention(false));
    }
}
