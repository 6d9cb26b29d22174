//! Mood classification from generated text.

use serde::{Deserialize, Serialize};
use std::fmt;

const EXCITED_MARKERS: &[&str] = &["mathematical", "adventure", "game", "music"];
const CARING_MARKERS: &[&str] = &["help", "friend", "love"];
const CONFUSED_MARKERS: &[&str] = &["confused", "don't know", "not sure", "?"];

/// BMO's current mood, derived from what it last said.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Content,
    Excited,
    Caring,
    Confused,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Content => "content",
            Mood::Excited => "excited",
            Mood::Caring => "caring",
            Mood::Confused => "confused",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a response. The first matching category wins, in the order
/// excited, caring, confused.
pub fn classify(text: &str) -> Mood {
    let text = text.to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if mentions(EXCITED_MARKERS) {
        Mood::Excited
    } else if mentions(CARING_MARKERS) {
        Mood::Caring
    } else if mentions(CONFUSED_MARKERS) {
        Mood::Confused
    } else {
        Mood::Content
    }
}
