//! Outbound provider event bus observed by the notification layer.

pub mod bus;

pub use bus::{ProviderEventBus, ProviderEventBusConfig, DEFAULT_BUFFER_CAPACITY};
