//! Shared engine state — settings, compiled roster, conversation selection,
//! and the conversation name cache. Owned once at construction and handed
//! to the scheduler, reconciler, and control surface (no ambient globals).

use std::collections::HashMap;
use std::sync::RwLock;

use wamark_core::types::{ClientEntry, ConversationInfo, ReactSettings};

use crate::matcher::{MatchPattern, PatternSet};

pub struct EngineState {
    settings: RwLock<ReactSettings>,
    roster: RwLock<Vec<ClientEntry>>,
    patterns: RwLock<PatternSet>,
    /// Conversation ids to act on; empty means all.
    selected: RwLock<Vec<String>>,
    names: RwLock<HashMap<String, String>>,
}

impl EngineState {
    pub fn new(settings: ReactSettings, roster: Vec<ClientEntry>, selected: Vec<String>) -> Self {
        let patterns = PatternSet::compile(&roster, settings.normalize_arabic);
        Self {
            settings: RwLock::new(settings),
            roster: RwLock::new(roster),
            patterns: RwLock::new(patterns),
            selected: RwLock::new(selected),
            names: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> ReactSettings {
        self.settings.read().expect("state lock poisoned").clone()
    }

    /// Replace the settings wholesale and recompile the roster patterns
    /// (the normalization toggle affects compilation).
    pub fn set_settings(&self, settings: ReactSettings) {
        tracing::info!(
            "[settings] mode={:?} rpm={} cooldown={}s normalize={}",
            settings.mode,
            settings.rate_per_minute,
            settings.cooldown_secs,
            settings.normalize_arabic
        );
        *self.settings.write().expect("state lock poisoned") = settings;
        self.recompile();
    }

    pub fn roster(&self) -> Vec<ClientEntry> {
        self.roster.read().expect("state lock poisoned").clone()
    }

    pub fn set_roster(&self, roster: Vec<ClientEntry>) {
        *self.roster.write().expect("state lock poisoned") = roster;
        self.recompile();
    }

    fn recompile(&self) {
        let fold = self.settings().normalize_arabic;
        let compiled = PatternSet::compile(&self.roster(), fold);
        *self.patterns.write().expect("state lock poisoned") = compiled;
    }

    /// First matching roster pattern for a message body, cloned out so no
    /// lock is held across awaits.
    pub fn match_body(&self, body: &str) -> Option<MatchPattern> {
        self.patterns
            .read()
            .expect("state lock poisoned")
            .match_body(body)
            .cloned()
    }

    pub fn has_patterns(&self) -> bool {
        !self.patterns.read().expect("state lock poisoned").is_empty()
    }

    pub fn selected(&self) -> Vec<String> {
        self.selected.read().expect("state lock poisoned").clone()
    }

    pub fn set_selected(&self, ids: Vec<String>) {
        *self.selected.write().expect("state lock poisoned") = ids;
    }

    /// Whether the bot should act in this conversation.
    pub fn is_selected(&self, conversation_id: &str) -> bool {
        let selected = self.selected.read().expect("state lock poisoned");
        selected.is_empty() || selected.iter().any(|id| id == conversation_id)
    }

    pub fn remember_names(&self, conversations: &[ConversationInfo]) {
        let mut names = self.names.write().expect("state lock poisoned");
        for c in conversations {
            names.insert(c.id.clone(), c.name.clone());
        }
    }

    /// Cached display name, falling back to the id.
    pub fn name_for(&self, conversation_id: &str) -> String {
        self.names
            .read()
            .expect("state lock poisoned")
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| conversation_id.to_string())
    }
}
