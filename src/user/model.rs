use serde::{Deserialize, Serialize};

use super::Sub;

/// Denormalized public profile attached to participants, message senders and
/// typing presence entries.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserInfo {
    pub sub: Sub,
    pub name: String,
    pub picture: Option<String>,
}

impl UserInfo {
    pub fn new(sub: impl Into<Sub>, name: &str) -> Self {
        Self {
            sub: sub.into(),
            name: name.to_string(),
            picture: None,
        }
    }
}
