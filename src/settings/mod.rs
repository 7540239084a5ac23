use std::env;

use log::warn;
use url::Url;

use crate::user;

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

/// Runtime configuration of the messaging core.
///
/// The current user's [`user::Sub`] is part of the configuration because the
/// core needs it to dedupe optimistic echoes and to patch the viewer's own
/// reactions.
#[derive(Clone)]
pub struct Settings {
    pub api_base: Url,
    pub token: Option<String>,
    pub me: user::Sub,
}

impl Settings {
    pub fn new(api_base: Url, me: user::Sub) -> Self {
        Self {
            api_base,
            token: None,
            me,
        }
    }

    pub fn with_token(self, token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..self
        }
    }

    /// Reads `API_BASE_URL`, `API_TOKEN` and `USER_SUB` from the environment,
    /// loading a `.env` file first when present.
    pub fn env() -> Option<Self> {
        dotenv::dotenv().ok();

        let api_base = env::var("API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string())
            .parse::<Url>()
            .ok();
        let token = env::var("API_TOKEN").ok();
        let me = env::var("USER_SUB").ok();

        if let (Some(api_base), Some(me)) = (api_base, me) {
            Some(Self {
                api_base,
                token,
                me: user::Sub(me),
            })
        } else {
            warn!("messaging env is not configured");
            None
        }
    }
}
