//! Category-based avatar and voice selection.
//!
//! Rules are evaluated top to bottom against the row's title and details; the
//! first rule whose keyword pattern matches wins. A default mapping always
//! exists, so every row gets an avatar and a recorded reason.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::path::Path;

use crate::models::video::AvatarMapping;

/// One rule as written in the JSON rule file.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRuleSpec {
    pub category: String,
    pub keywords: Vec<String>,
    pub avatar_id: String,
    pub voice_id: String,
    pub duration_secs: u32,
}

#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: String,
    pattern: Regex,
    pub avatar_id: String,
    pub voice_id: String,
    pub duration_secs: u32,
}

impl CategoryRule {
    pub fn new(spec: CategoryRuleSpec) -> Result<Self, MappingError> {
        let keywords: Vec<String> = spec
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(keyword_pattern)
            .collect();
        if keywords.is_empty() {
            return Err(MappingError::NoKeywords(spec.category));
        }

        let pattern = RegexBuilder::new(&keywords.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| MappingError::Pattern(spec.category.clone(), e.to_string()))?;

        Ok(Self {
            category: spec.category,
            pattern,
            avatar_id: spec.avatar_id,
            voice_id: spec.voice_id,
            duration_secs: spec.duration_secs,
        })
    }

    /// The keyword that matched, as it appears in the text.
    fn matched_keyword<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern.find(text).map(|m| m.as_str())
    }
}

/// Escaped keyword with word boundaries on its word-character edges only, so
/// `c++` or `3-pack!` still match while `pan` stays out of `panorama`.
fn keyword_pattern(keyword: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let start = if is_word(keyword.chars().next()) { r"\b" } else { "" };
    let end = if is_word(keyword.chars().last()) { r"\b" } else { "" };
    format!("{}{}{}", start, regex::escape(keyword), end)
}

/// Fallback used when no rule matches.
#[derive(Debug, Clone)]
pub struct DefaultMapping {
    pub avatar_id: String,
    pub voice_id: String,
    pub duration_secs: u32,
}

/// Ordered rule table with a mandatory default.
#[derive(Debug, Clone)]
pub struct AvatarMapper {
    rules: Vec<CategoryRule>,
    default: DefaultMapping,
}

impl AvatarMapper {
    pub fn new(rules: Vec<CategoryRule>, default: DefaultMapping) -> Self {
        Self { rules, default }
    }

    pub fn from_specs(specs: Vec<CategoryRuleSpec>, default: DefaultMapping) -> Result<Self, MappingError> {
        let rules = specs
            .into_iter()
            .map(CategoryRule::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules, default))
    }

    /// Load rules from a JSON array of [`CategoryRuleSpec`].
    pub fn from_file(path: &Path, default: DefaultMapping) -> Result<Self, MappingError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MappingError::Read(path.display().to_string(), e.to_string()))?;
        let specs: Vec<CategoryRuleSpec> = serde_json::from_str(&raw)
            .map_err(|e| MappingError::Read(path.display().to_string(), e.to_string()))?;
        Self::from_specs(specs, default)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Pick avatar, voice and duration for a row's title and details.
    pub fn map(&self, title: &str, details: &str) -> AvatarMapping {
        for rule in &self.rules {
            let hit = rule
                .matched_keyword(title)
                .map(|k| (k, "title"))
                .or_else(|| rule.matched_keyword(details).map(|k| (k, "details")));

            if let Some((keyword, field)) = hit {
                return AvatarMapping {
                    category: Some(rule.category.clone()),
                    avatar_id: rule.avatar_id.clone(),
                    voice_id: rule.voice_id.clone(),
                    duration_secs: rule.duration_secs,
                    reason: format!(
                        "category '{}' matched keyword '{}' in {}",
                        rule.category, keyword, field
                    ),
                };
            }
        }

        AvatarMapping {
            category: None,
            avatar_id: self.default.avatar_id.clone(),
            voice_id: self.default.voice_id.clone(),
            duration_secs: self.default.duration_secs,
            reason: if self.rules.is_empty() {
                "default mapping (no category rules configured)".to_string()
            } else {
                format!("default mapping (none of {} category rules matched)", self.rules.len())
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Category rule '{0}' has no keywords")]
    NoKeywords(String),

    #[error("Category rule '{0}' has an invalid pattern: {1}")]
    Pattern(String, String),

    #[error("Failed to load category rules from {0}: {1}")]
    Read(String, String),
}
