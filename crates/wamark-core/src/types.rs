//! Domain types shared between the engine, store, and control surface.

use serde::{Deserialize, Serialize};

/// How the bot reacts to a matched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionMode {
    /// React with an emoji on the matched message.
    Emoji,
    /// Reply with a fixed text, quoting the matched message.
    Text,
}

/// Reaction behavior settings. A single process-wide value, replaced
/// wholesale on update; replacing it triggers pattern recompilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactSettings {
    #[serde(default = "default_mode")]
    pub mode: ReactionMode,
    #[serde(default = "default_emoji")]
    pub emoji: String,
    #[serde(default = "default_reply_text")]
    pub reply_text: String,
    /// Global cap on dispatched actions per fixed one-minute window.
    #[serde(default = "default_rate_per_minute", rename = "ratePerMinute")]
    pub rate_per_minute: u32,
    /// Minimum spacing between actions within one conversation.
    #[serde(default = "default_cooldown_secs", rename = "cooldownSec")]
    pub cooldown_secs: u64,
    #[serde(default = "bool_true", rename = "normalizeArabic")]
    pub normalize_arabic: bool,
}

fn default_mode() -> ReactionMode { ReactionMode::Emoji }
fn default_emoji() -> String { "✅".into() }
fn default_reply_text() -> String { "تم ✅".into() }
fn default_rate_per_minute() -> u32 { 20 }
fn default_cooldown_secs() -> u64 { 3 }
fn bool_true() -> bool { true }

impl Default for ReactSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            emoji: default_emoji(),
            reply_text: default_reply_text(),
            rate_per_minute: default_rate_per_minute(),
            cooldown_secs: default_cooldown_secs(),
            normalize_arabic: true,
        }
    }
}

/// A client roster entry: the name to watch for and the emoji to answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub name: String,
    pub emoji: String,
}

impl ClientEntry {
    /// Parse a raw roster text, one `name|emoji` per line. The emoji part is
    /// optional and falls back to `fallback_emoji`. Blank lines and exact
    /// duplicates are dropped.
    pub fn parse_roster(raw: &str, fallback_emoji: &str) -> Vec<ClientEntry> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, emoji) = match line.split_once('|') {
                Some((n, e)) => (n.trim(), e.trim()),
                None => (line, ""),
            };
            if name.is_empty() {
                continue;
            }
            let emoji = if emoji.is_empty() { fallback_emoji } else { emoji };
            if seen.insert(format!("{name}|{emoji}")) {
                out.push(ClientEntry { name: name.into(), emoji: emoji.into() });
            }
        }
        out
    }
}

/// A conversation (group chat) as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: String,
    pub name: String,
    /// Participant count.
    pub size: usize,
}

/// Stable identifier of a message within the gateway, also used as the
/// pagination cursor for history fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub from_me: bool,
}

impl MessageKey {
    /// Composite dedup identifier: non-empty key components joined with `::`.
    /// Returns `None` when no component exists — such a message cannot be
    /// deduplicated and is always reprocessed.
    pub fn dedup_id(&self) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        if !self.id.is_empty() {
            parts.push(&self.id);
        }
        if !self.conversation_id.is_empty() {
            parts.push(&self.conversation_id);
        }
        if let Some(sender) = self.sender_id.as_deref()
            && !sender.is_empty()
        {
            parts.push(sender);
        }
        if parts.is_empty() { None } else { Some(parts.join("::")) }
    }
}

/// An inbound message event as delivered by the gateway, either from the
/// live push stream or from a paginated history fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub key: MessageKey,
    /// Seconds since epoch, as the gateway reports it.
    pub timestamp_secs: i64,
    #[serde(default)]
    pub text: Option<String>,
    /// Media caption, used when no plain text body exists.
    #[serde(default)]
    pub caption: Option<String>,
}

impl Envelope {
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_secs * 1000
    }

    /// Best-effort text body across the message variants.
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .or(self.caption.as_deref())
            .unwrap_or("")
            .trim()
    }
}
