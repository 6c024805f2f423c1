//! Caption cleanup: replacement rules and the default cleaner.
//!
//! The cleaner turns free-form model output into the short, comma separated,
//! lowercase phrase list used for training captions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Default prompt for long captions.
///
/// Florence-2 is driven by task tags, so the adapter does not forward this text
/// to the model. It is kept as the caller-facing default for `CaptionOptions`.
pub const DEFAULT_LONG_PROMPT: &str = "caption this image. describe every single thing in the image in detail. \
Do not include any unnecessary words in your description for the sake of good grammar. \
I want many short statements that serve the single purpose of giving the most thorough description \
if items as possible in the smallest, comma separated way possible. \
be sure to describe people's moods, clothing, the environment, lighting, colors, and everything.";

/// A single substitution applied to a caption.
///
/// A `find` starting with `*` is a drop rule: if the caption starts with the
/// rest of the pattern the whole caption is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Text to look for
    pub find: String,
    /// Text to substitute
    pub replace: String,
}

impl Replacement {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }

    /// The prefix this rule drops on, if it is a drop rule.
    pub fn drop_prefix(&self) -> Option<&str> {
        self.find.strip_prefix('*')
    }
}

/// Ordered set of replacements applied during cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplacementRules(Vec<Replacement>);

impl ReplacementRules {
    /// A ruleset with no substitutions.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Replacement> {
        self.0.iter()
    }

    /// Append a rule, returning the extended set.
    pub fn with(mut self, find: impl Into<String>, replace: impl Into<String>) -> Self {
        self.0.push(Replacement::new(find, replace));
        self
    }
}

impl Default for ReplacementRules {
    fn default() -> Self {
        Self(
            [
                "the image features",
                "the image shows",
                "the image depicts",
                "the image is",
                "in this image",
                "in the image",
            ]
            .into_iter()
            .map(|find| Replacement::new(find, ""))
            .collect(),
        )
    }
}

/// Final cleanup stage applied to every caption.
pub trait CaptionCleaner: Send + Sync {
    fn clean(&self, caption: &str, rules: &ReplacementRules) -> String;
}

/// The standard caption cleaner.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCleaner;

impl CaptionCleaner for DefaultCleaner {
    fn clean(&self, caption: &str, rules: &ReplacementRules) -> String {
        clean_caption(caption, rules)
    }
}

/// Normalize a caption into a deduplicated, comma separated phrase list.
pub fn clean_caption(caption: &str, rules: &ReplacementRules) -> String {
    let flattened = caption
        .replace('\n', ", ")
        .replace('\r', ", ")
        .replace('.', ",")
        .replace('"', "");

    let ascii: String = flattened.chars().filter(char::is_ascii).collect();
    let mut cap = ascii
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    for rule in rules.iter() {
        match rule.drop_prefix() {
            Some(prefix) => {
                if cap.starts_with(prefix) {
                    cap.clear();
                }
            }
            None => {
                let find = rule.find.to_lowercase();
                if !find.is_empty() {
                    cap = cap.replace(&find, &rule.replace.to_lowercase());
                }
            }
        }
    }

    let mut seen = HashSet::new();
    cap.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter(|part| seen.insert(*part))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentences_become_phrases() {
        let out = clean_caption(
            "A red car. Parked on a street.\nSunny day.",
            &ReplacementRules::empty(),
        );
        assert_eq!(out, "a red car, parked on a street, sunny day");
    }

    #[test]
    fn test_default_rules_strip_boilerplate() {
        let out = clean_caption(
            "In the image a woman is smiling, the image depicts a park",
            &ReplacementRules::default(),
        );
        assert_eq!(out, "a woman is smiling, a park");
    }

    #[test]
    fn test_custom_rule_applies() {
        let rules = ReplacementRules::empty().with("foo", "bar");
        let out = clean_caption("a foo on a table", &rules);
        assert_eq!(out, "a bar on a table");
    }

    #[test]
    fn test_rules_are_case_insensitive_on_find() {
        let rules = ReplacementRules::empty().with("Foo", "BAR");
        assert_eq!(clean_caption("FOO fighters", &rules), "bar fighters");
    }

    #[test]
    fn test_drop_rule_discards_caption() {
        let rules = ReplacementRules::empty().with("*i'm sorry", "");
        assert_eq!(clean_caption("I'm sorry, I can't help", &rules), "");
        assert_eq!(clean_caption("a dog", &rules), "a dog");
    }

    #[test]
    fn test_removes_duplicates_and_quotes() {
        let out = clean_caption(
            "\"blue sky\", blue sky, clouds,, clouds",
            &ReplacementRules::empty(),
        );
        assert_eq!(out, "blue sky, clouds");
    }

    #[test]
    fn test_drops_non_ascii_and_extra_spaces() {
        let out = clean_caption("a   café  with ☕ cups", &ReplacementRules::empty());
        assert_eq!(out, "a caf with cups");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_caption("", &ReplacementRules::default()), "");
    }

    #[test]
    fn test_rules_serialize_as_table_array() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            replacements: ReplacementRules,
        }

        let wrapper = Wrapper {
            replacements: ReplacementRules::empty().with("foo", "bar"),
        };
        let toml = toml::to_string(&wrapper).unwrap();
        let back: Wrapper = toml::from_str(&toml).unwrap();
        assert_eq!(back.replacements, wrapper.replacements);
    }
}
