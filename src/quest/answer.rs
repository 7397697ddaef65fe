//! Answer Validation
//!
//! Free-text answer checks for location-code and puzzle steps. The
//! normalization policy is part of the quest data, so two steps may compare
//! answers differently.

use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// How user input and accepted answers are normalized before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    /// Strip leading/trailing whitespace
    pub trim: bool,
    /// Compare lowercase forms
    pub case_insensitive: bool,
    /// Drop combining marks after canonical decomposition ("ё" == "е", "é" == "e")
    pub strip_diacritics: bool,
    /// Fold runs of inner whitespace into a single space
    pub collapse_whitespace: bool,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            trim: true,
            case_insensitive: true,
            strip_diacritics: false,
            collapse_whitespace: true,
        }
    }
}

impl Normalization {
    /// Exact comparison, nothing folded
    pub fn strict() -> Self {
        Self {
            trim: false,
            case_insensitive: false,
            strip_diacritics: false,
            collapse_whitespace: false,
        }
    }

    /// Everything folded
    pub fn lenient() -> Self {
        Self {
            strip_diacritics: true,
            ..Self::default()
        }
    }

    pub fn apply(&self, input: &str) -> String {
        let mut value = if self.trim {
            input.trim().to_string()
        } else {
            input.to_string()
        };

        if self.collapse_whitespace {
            value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        if self.case_insensitive {
            // Lowercasing keeps "ß" while uppercase input spells it "SS"
            value = value.to_lowercase().replace('ß', "ss");
        }

        if self.strip_diacritics {
            value = value.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect();
        }

        value
    }
}

/// A validator over a set of acceptable answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCheck {
    /// Equivalent accepted answers
    pub accept: Vec<String>,
    #[serde(default)]
    pub normalization: Normalization,
}

impl AnswerCheck {
    pub fn new<I, S>(accept: I, normalization: Normalization) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accept: accept.into_iter().map(Into::into).collect(),
            normalization,
        }
    }

    /// Whether some input can pass: at least one accepted answer survives
    /// normalization as non-blank text
    pub fn is_satisfiable(&self) -> bool {
        self.accept
            .iter()
            .any(|expected| !self.normalization.apply(expected).trim().is_empty())
    }

    /// Check raw user input against every accepted answer
    pub fn accepts(&self, input: &str) -> bool {
        let candidate = self.normalization.apply(input);
        if candidate.trim().is_empty() {
            return false;
        }

        self.accept
            .iter()
            .any(|expected| self.normalization.apply(expected) == candidate)
    }
}
