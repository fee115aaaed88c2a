//! Guest / booker / company profiles
//!
//! Profiles are opaque JSON documents keyed by a stable id. The engine only
//! persists and replicates them.

use serde::{Deserialize, Serialize};

/// Remote table a profile belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTable {
    Companies,
    Guests,
    Bookers,
}

impl ProfileTable {
    pub const ALL: [ProfileTable; 3] = [Self::Companies, Self::Guests, Self::Bookers];

    /// Table name, used both locally and on the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Companies => "companies",
            Self::Guests => "guests",
            Self::Bookers => "bookers",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "companies" => Some(Self::Companies),
            "guests" => Some(Self::Guests),
            "bookers" => Some(Self::Bookers),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfileTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub data: serde_json::Value,
}
