//! Server-Sent Events broadcast hub

mod events;
mod hub;

pub use events::SseEvent;
pub use hub::{Hub, HubCoordinator, Subscription};
