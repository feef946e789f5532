//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Enforcement tier. Ordered: `None < Draft < Final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Anything structurally valid goes; name clashes are auto-suffixed.
    None,
    /// Required pointers stay set, targets must match reference lists,
    /// renames may not clash.
    #[default]
    Draft,
    /// Draft, plus required fields on creation, minimum field counts and
    /// eager name uniqueness.
    Final,
}

impl std::fmt::Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strictness::None => write!(f, "none"),
            Strictness::Draft => write!(f, "draft"),
            Strictness::Final => write!(f, "final"),
        }
    }
}

/// Configuration for a [`Store`](super::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub strictness: Strictness,
    /// Placed between a clashing name and its numeric suffix.
    pub name_suffix_separator: String,
    /// Highest suffix tried before a rename gives up with a conflict.
    pub max_name_suffix: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strictness: Strictness::Draft,
            name_suffix_separator: " ".to_string(),
            max_name_suffix: 10_000,
        }
    }
}

impl StoreConfig {
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
