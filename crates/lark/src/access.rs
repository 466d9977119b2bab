//! Access gates for the inbound pipeline.
//!
//! Each gate inspects the event and either lets it continue or terminates
//! processing with a [`Rejection`] reason. Gates are pure; side effects
//! (pairing handshakes, event emission) live in `handlers`.

use std::collections::HashMap;

use magpie_channels::gating::{self, DmPolicy, GroupPolicy};

use crate::{
    config::{GroupEntry, LarkAccountConfig},
    mention::MentionInfo,
};

/// Reason an inbound message was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    BotSender,
    GroupsDisabled,
    /// `group_policy = allowlist` but no group map is configured at all.
    GroupsNotConfigured,
    /// No entry matched this group and no wildcard entry exists.
    GroupNotAllowed,
    /// The matched entry is explicitly switched off.
    GroupEntryDisabled,
    /// The group has a member allow-list and the sender is not on it.
    SenderNotInGroup,
    DmsDisabled,
    DmSenderNotAllowed,
    NotMentioned,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BotSender => write!(f, "sender is a bot"),
            Self::GroupsDisabled => write!(f, "groups are disabled"),
            Self::GroupsNotConfigured => write!(f, "no group allow-list configured"),
            Self::GroupNotAllowed => write!(f, "group not on allow-list"),
            Self::GroupEntryDisabled => write!(f, "group entry is disabled"),
            Self::SenderNotInGroup => write!(f, "sender not in group allow-list"),
            Self::DmsDisabled => write!(f, "DMs are disabled"),
            Self::DmSenderNotAllowed => write!(f, "sender not on DM allow-list"),
            Self::NotMentioned => write!(f, "bot was not mentioned"),
        }
    }
}

// ── Group gate ──────────────────────────────────────────────────────────────

/// Resolve the [`GroupEntry`] for a conversation: exact chat id, exact name,
/// lowercased name, then the `"*"` wildcard. Deterministic and
/// case-normalized.
#[must_use]
pub fn resolve_group_entry<'a>(
    groups: Option<&'a HashMap<String, GroupEntry>>,
    chat_id: &str,
    chat_name: Option<&str>,
) -> Option<&'a GroupEntry> {
    let groups = groups?;
    if let Some(entry) = groups.get(chat_id) {
        return Some(entry);
    }
    if let Some(name) = chat_name {
        if let Some(entry) = groups.get(name) {
            return Some(entry);
        }
        let lowered = name.trim().to_lowercase();
        // Ties between keys that lowercase identically resolve to the
        // lexicographically smallest key, keeping the lookup deterministic.
        if let Some((_, entry)) = groups
            .iter()
            .filter(|(key, _)| key.trim().to_lowercase() == lowered)
            .min_by(|(a, _), (b, _)| a.cmp(b))
        {
            return Some(entry);
        }
    }
    groups.get(gating::WILDCARD)
}

/// Apply group-level policy. On success, returns the resolved entry (if any)
/// so its overrides can take precedence downstream.
pub fn evaluate_group<'a>(
    config: &'a LarkAccountConfig,
    chat_id: &str,
    chat_name: Option<&str>,
    sender_id: &str,
) -> Result<Option<&'a GroupEntry>, Rejection> {
    let entry = resolve_group_entry(config.groups.as_ref(), chat_id, chat_name);

    match config.group_policy {
        GroupPolicy::Disabled => return Err(Rejection::GroupsDisabled),
        GroupPolicy::Allowlist => {
            // "Not configured" is distinct from "configured but no match":
            // with no group map at all, the policy rejects everything,
            // wildcard or not.
            if config.groups.is_none() {
                return Err(Rejection::GroupsNotConfigured);
            }
            if entry.is_none() {
                return Err(Rejection::GroupNotAllowed);
            }
        },
        GroupPolicy::Open => {},
    }

    if let Some(entry) = entry {
        // Explicit off-switches win regardless of policy.
        if entry.is_blocked() {
            return Err(Rejection::GroupEntryDisabled);
        }
        if !entry.users.is_empty() && !gating::is_allowed(sender_id, &entry.users) {
            return Err(Rejection::SenderNotInGroup);
        }
    }

    Ok(entry)
}

// ── DM gate ─────────────────────────────────────────────────────────────────

/// Policy decision for a direct message. The pairing side effect itself is
/// performed by the caller when `needs_pairing` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmDecision {
    Allow,
    Deny { needs_pairing: bool },
}

/// Apply DM-level policy. `merged_allow` is the union of statically
/// configured entries and pairing-store approvals.
#[must_use]
pub fn evaluate_direct(policy: DmPolicy, sender_id: &str, merged_allow: &[String]) -> DmDecision {
    match policy {
        DmPolicy::Disabled => DmDecision::Deny {
            needs_pairing: false,
        },
        DmPolicy::Open => DmDecision::Allow,
        DmPolicy::Allowlist | DmPolicy::Pairing => {
            if gating::is_allowed(sender_id, merged_allow) {
                DmDecision::Allow
            } else {
                DmDecision::Deny {
                    needs_pairing: policy == DmPolicy::Pairing,
                }
            }
        },
    }
}

// ── Command authorization ───────────────────────────────────────────────────

/// Whether the body carries a control command at all.
#[must_use]
pub fn has_control_command(body: &str) -> bool {
    body.trim_start().starts_with('/')
}

/// Decide whether the sender may issue control commands in this conversation.
///
/// Groups consult the group's member list; DMs consult the union of the
/// configured allow-list and pairing-store approvals. When `use_access_groups`
/// is off the allow-list requirement is waived entirely.
#[must_use]
pub fn resolve_command_authorized(
    sender_id: &str,
    is_group: bool,
    group_users: Option<&[String]>,
    dm_allow: &[String],
    store_allow: &[String],
    use_access_groups: bool,
) -> bool {
    if !use_access_groups {
        return true;
    }
    if is_group {
        return group_users.is_some_and(|users| gating::is_allowed(sender_id, users));
    }
    let mut merged: Vec<String> = dm_allow.to_vec();
    merged.extend(store_allow.iter().cloned());
    gating::is_allowed(sender_id, &merged)
}

// ── Mention gate ────────────────────────────────────────────────────────────

/// Outcome of the mention gate for group conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentionGate {
    pub should_skip: bool,
    /// Mention flag after bypass resolution, used for logging and the
    /// routing context.
    pub effective_was_mentioned: bool,
}

/// Final skip/continue decision for group messages.
///
/// An authorized control command bypasses the mention requirement. When the
/// payload shape makes mention detection impossible, the gate fails open
/// (configurable via `fail_open`): enforcement must not silently block every
/// message on plain-text-only clients, but must still block ordinary chatter
/// where detection works and no mention occurred.
#[must_use]
pub fn resolve_mention_gate(
    require_mention: bool,
    mention: &MentionInfo,
    command_bypass: bool,
    fail_open: bool,
) -> MentionGate {
    if !require_mention {
        return MentionGate {
            should_skip: false,
            effective_was_mentioned: mention.was_mentioned,
        };
    }
    if mention.was_mentioned {
        return MentionGate {
            should_skip: false,
            effective_was_mentioned: true,
        };
    }
    if command_bypass {
        return MentionGate {
            should_skip: false,
            effective_was_mentioned: true,
        };
    }
    if !mention.can_detect_mention {
        return MentionGate {
            should_skip: !fail_open,
            effective_was_mentioned: false,
        };
    }
    MentionGate {
        should_skip: true,
        effective_was_mentioned: false,
    }
}
