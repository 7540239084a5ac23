pub mod client;

pub use client::{Api, HttpApi, MessagingApi};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("api responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    _Http(#[from] reqwest::Error),
    #[error(transparent)]
    _Url(#[from] url::ParseError),
    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}
