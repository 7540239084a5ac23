pub mod bus;
pub mod feed;
pub mod model;

pub use bus::EventBus;
pub use feed::{ChangeFeed, EventStream, Feed, PresenceStream};
pub use model::{AppEvent, ChangeEvent, Topic};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("change feed unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}
