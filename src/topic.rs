use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::TopicError;

/// A topic name, parsed once from either of its spellings.
///
/// Topics travel as "Holocaust And Revival" in storage and as
/// "holocaust-and-revival" in navigation paths. Both parse to the same value.
/// Equality ignores the spelling the name was parsed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicName {
    words: Vec<String>,
    given: String,
}

/// Spaces and hyphens separate words; nothing else does.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == '-'
}

impl TopicName {
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        let words: Vec<String> = raw
            .split(is_separator)
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();

        if words.is_empty() {
            return Err(TopicError::Empty);
        }

        Ok(Self {
            words,
            given: raw.trim().to_string(),
        })
    }

    /// The trimmed spelling this name was parsed from.
    pub fn as_given(&self) -> &str {
        &self.given
    }

    /// Title-cased words joined by spaces.
    pub fn db_form(&self) -> String {
        self.words
            .iter()
            .map(|word| capitalize(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lowercase words joined by hyphens.
    pub fn url_form(&self) -> String {
        self.words.join("-")
    }

    /// Lowercased with separators stripped; two spellings of a topic share this key.
    pub fn match_key(&self) -> String {
        self.words.concat()
    }
}

pub fn are_equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !is_separator(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl PartialEq for TopicName {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl Eq for TopicName {}

impl Hash for TopicName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.words.hash(state);
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.db_form())
    }
}

impl TryFrom<String> for TopicName {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TopicName> for String {
    fn from(value: TopicName) -> Self {
        value.db_form()
    }
}

impl std::str::FromStr for TopicName {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
