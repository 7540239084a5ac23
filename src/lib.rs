//! Client-side realtime conversation core of the platform.
//!
//! The data store, change-feed transport and object storage are external
//! collaborators, reached through [`api::MessagingApi`] and
//! [`event::ChangeFeed`]. This crate owns the state that sits on top of
//! them: the live conversation list, the per-conversation message history,
//! typing presence, and the shared unread counter.
//!
//! Logical races between the insertion paths (optimistic send, feed echo,
//! catch-up fetch, cross-store events) are resolved by idempotent merges
//! keyed on message id, not by locking.

pub mod api;
pub mod conversation;
pub mod debounce;
pub mod event;
pub mod logger;
pub mod message;
pub mod settings;
pub mod unread;
pub mod user;

pub use conversation::ConversationService;
pub use event::EventBus;
pub use message::MessageStore;
pub use settings::Settings;
pub use unread::UnreadService;
