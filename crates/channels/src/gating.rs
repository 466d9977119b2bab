use serde::{Deserialize, Serialize};

/// Allow-list entries may carry a channel/kind namespace tag; these are
/// stripped before comparison so `user:ou_abc` matches the bare id `ou_abc`.
const ALLOW_ENTRY_PREFIXES: &[&str] = &["user:", "open_id:", "id:"];

/// Token that matches any sender.
pub const WILDCARD: &str = "*";

/// Check whether a sender identity passes a configured allow-list.
///
/// Pure function with no side effects. The wildcard token `"*"` matches every
/// sender, including the empty string; an empty allow-list matches nobody —
/// the wildcard is the only way to allow everyone. All other entries are
/// compared exactly after normalization (trim, lowercase, namespace prefix
/// stripped from the entry).
pub fn is_allowed(sender_id: &str, allowlist: &[String]) -> bool {
    if allowlist.iter().any(|entry| entry.trim() == WILDCARD) {
        return true;
    }
    let sender = sender_id.trim().to_lowercase();
    allowlist
        .iter()
        .any(|entry| normalize_entry(entry) == sender)
}

/// Normalize one allow-list entry: trim, strip a recognized namespace prefix,
/// lowercase.
fn normalize_entry(entry: &str) -> String {
    let trimmed = entry.trim();
    let stripped = ALLOW_ENTRY_PREFIXES
        .iter()
        .find_map(|prefix| {
            // `get` rejects slices that would split a multibyte character,
            // so entries like "userë" cannot panic here.
            let head = trimmed.get(..prefix.len())?;
            if head.eq_ignore_ascii_case(prefix) {
                trimmed.get(prefix.len()..)
            } else {
                None
            }
        })
        .unwrap_or(trimmed);
    stripped.to_lowercase()
}

/// DM access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    /// Unknown senders receive a pairing code and must be approved.
    #[default]
    Pairing,
    /// Only senders on the allow-list.
    Allowlist,
    /// Anyone can DM the bot.
    Open,
    /// DMs disabled.
    Disabled,
}

/// Group access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    /// Only groups with a configured entry (or a wildcard entry).
    #[default]
    Allowlist,
    /// Bot responds in all groups.
    Open,
    /// Groups disabled.
    Disabled,
}
