//! Mention extraction.
//!
//! Decides whether the bot was addressed, and — just as important — whether
//! the payload shape even allows mention detection. Plain-text bodies with no
//! structured mention list and no inline escape carry no signal either way;
//! the mention gate must not treat "not mentioned" as meaningful for those.

use crate::event::MentionEntry;

/// Inline escape Lark clients use to embed a mention in plain text.
const INLINE_AT_MARKER: &str = "<at ";

/// The bot's own identifiers, captured at account start.
#[derive(Debug, Clone, Default)]
pub struct BotIdentity {
    pub open_id: Option<String>,
    pub user_id: Option<String>,
    /// Display name shown in mention entries.
    pub name: Option<String>,
}

/// Derived, per-event mention facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentionInfo {
    /// Any mention present at all, even of unrelated users.
    pub has_any_mention: bool,
    /// The bot specifically was targeted.
    pub was_mentioned: bool,
    /// Whether this payload shape allows mention detection at all. When
    /// false, `was_mentioned == false` is an artifact, not a signal.
    pub can_detect_mention: bool,
}

/// Extract mention facts from the structured mention list and the raw body.
#[must_use]
pub fn extract(mentions: &[MentionEntry], body: &str, bot: &BotIdentity) -> MentionInfo {
    let inline_present = body.contains(INLINE_AT_MARKER);
    let has_any_mention = !mentions.is_empty() || inline_present;
    let can_detect_mention = has_any_mention;

    let mut was_mentioned = mentions.iter().any(|entry| targets_bot(entry, bot));

    // Fallback for clients that only echo the inline escape without a
    // structured entry for it.
    if !was_mentioned && inline_present {
        if let Some(open_id) = bot.open_id.as_deref() {
            if body.contains(&format!("<at user_id=\"{open_id}\"")) {
                was_mentioned = true;
            }
        }
    }

    MentionInfo {
        has_any_mention,
        was_mentioned,
        can_detect_mention,
    }
}

fn targets_bot(entry: &MentionEntry, bot: &BotIdentity) -> bool {
    if ids_match(entry.open_id.as_deref(), bot.open_id.as_deref()) {
        return true;
    }
    if ids_match(entry.user_id.as_deref(), bot.user_id.as_deref()) {
        return true;
    }
    match (entry.name.as_deref(), bot.name.as_deref()) {
        (Some(a), Some(b)) => !a.is_empty() && a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

fn ids_match(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if !x.is_empty() && x == y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> BotIdentity {
        BotIdentity {
            open_id: Some("ou_bot".into()),
            user_id: Some("bot_uid".into()),
            name: Some("Magpie".into()),
        }
    }

    fn entry(open_id: &str, name: &str) -> MentionEntry {
        MentionEntry {
            key: "@_user_1".into(),
            open_id: Some(open_id.into()),
            user_id: None,
            name: Some(name.into()),
        }
    }

    #[test]
    fn plain_text_is_undetectable() {
        let info = extract(&[], "hello", &bot());
        assert!(!info.has_any_mention);
        assert!(!info.was_mentioned);
        assert!(!info.can_detect_mention);
    }

    #[test]
    fn structured_mention_of_bot() {
        let info = extract(&[entry("ou_bot", "Magpie")], "@_user_1 hi", &bot());
        assert!(info.has_any_mention);
        assert!(info.was_mentioned);
        assert!(info.can_detect_mention);
    }

    #[test]
    fn structured_mention_of_someone_else() {
        let info = extract(&[entry("ou_other", "Alice")], "@_user_1 hi", &bot());
        assert!(info.has_any_mention);
        assert!(!info.was_mentioned);
        assert!(info.can_detect_mention, "detection worked, bot just wasn't targeted");
    }

    #[test]
    fn name_match_is_case_insensitive() {
        let info = extract(&[entry("", "magpie")], "hi", &bot());
        assert!(info.was_mentioned);
    }

    #[test]
    fn empty_ids_never_match() {
        let no_ids = BotIdentity::default();
        let info = extract(&[entry("", "")], "hi", &no_ids);
        assert!(!info.was_mentioned);
    }

    #[test]
    fn inline_escape_fallback_matches_bot_open_id() {
        let body = "ping <at user_id=\"ou_bot\"></at> please";
        let info = extract(&[], body, &bot());
        assert!(info.has_any_mention);
        assert!(info.was_mentioned);
        assert!(info.can_detect_mention);
    }

    #[test]
    fn inline_escape_of_other_user_is_detectable_but_not_us() {
        let body = "cc <at user_id=\"ou_other\"></at>";
        let info = extract(&[], body, &bot());
        assert!(info.has_any_mention);
        assert!(!info.was_mentioned);
        assert!(info.can_detect_mention);
    }
}
