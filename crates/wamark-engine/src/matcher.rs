//! Name matching — Arabic-aware normalization and compiled token patterns.
//!
//! Patterns are compiled from the client roster and must be rebuilt
//! whenever the roster or the normalization setting changes. Matching is
//! first-match-wins over the roster order.

use regex::Regex;
use wamark_core::types::ClientEntry;

/// Normalize text for matching. With `fold_arabic` the full pipeline runs:
/// invisible/direction marks stripped, diacritics and tatweel removed,
/// letter variants folded, Arabic-Indic digits mapped to ASCII, anything
/// that is not a letter or number collapsed to whitespace, lowercased.
/// Without it, plain lowercasing only.
pub fn normalize(text: &str, fold_arabic: bool) -> String {
    if !fold_arabic {
        return text.to_lowercase();
    }
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let mapped = match ch {
            // zero-width and bidi control marks
            '\u{200c}'..='\u{200f}' | '\u{202a}'..='\u{202e}' => continue,
            // harakat, dagger alef, tatweel
            '\u{064b}'..='\u{0652}' | '\u{0670}' | '\u{0640}' => continue,
            'أ' | 'إ' | 'آ' | 'ٱ' => 'ا',
            'ى' => 'ي',
            'ة' => 'ه',
            'ؤ' => 'و',
            'ئ' => 'ي',
            '٠'..='٩' => char::from(b'0' + (ch as u32 - 0x0660) as u8),
            c if c.is_alphanumeric() => c,
            _ => ' ',
        };
        out.push(mapped);
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Token-boundary pattern tolerant of punctuation between name tokens.
fn build_name_regex(norm_name: &str) -> Option<Regex> {
    let tokens: Vec<&str> = norm_name
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2)
        .collect();
    if tokens.is_empty() {
        return None;
    }
    let body = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join(r"[\s\p{P}]*");
    Regex::new(&format!(r"(?:^|\s){body}(?:\s|$)")).ok()
}

/// One compiled roster entry.
#[derive(Debug, Clone)]
pub struct MatchPattern {
    pub name: String,
    pub emoji: String,
    regex: Regex,
}

/// The compiled roster, in configured order.
#[derive(Debug, Default)]
pub struct PatternSet {
    patterns: Vec<MatchPattern>,
    fold_arabic: bool,
}

impl PatternSet {
    /// Compile the roster. Entries whose pattern cannot be built (empty
    /// name, no usable tokens) are dropped; the rest are unaffected.
    pub fn compile(roster: &[ClientEntry], fold_arabic: bool) -> Self {
        let mut patterns = Vec::with_capacity(roster.len());
        for entry in roster {
            let norm = normalize(&entry.name, fold_arabic);
            match build_name_regex(&norm) {
                Some(regex) => patterns.push(MatchPattern {
                    name: entry.name.clone(),
                    emoji: entry.emoji.clone(),
                    regex,
                }),
                None => {
                    tracing::warn!("⚠️ Dropped unmatchable client entry: '{}'", entry.name);
                }
            }
        }
        tracing::info!("clients loaded: {}", patterns.len());
        Self { patterns, fold_arabic }
    }

    /// First roster entry whose pattern matches the (raw) message body.
    pub fn match_body(&self, body: &str) -> Option<&MatchPattern> {
        if body.is_empty() {
            return None;
        }
        let norm = normalize(body, self.fold_arabic);
        self.patterns.iter().find(|p| p.regex.is_match(&norm))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
