use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub mod model;

pub use model::UserInfo;

/// Stable subject identifier of a platform user, as issued by the identity
/// provider.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Sub(pub String);

impl Sub {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Sub {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for Sub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Sub {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sub {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Sub, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Sub(s))
    }
}
