//! Process-wide unread counter shared by every surface that shows the badge
//! (navbar, sidebar), so one subscription and fetch loop exists per process.

pub mod service;

pub use service::{UnreadHandle, UnreadService};
