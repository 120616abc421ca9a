use jetbridge_protocol::ProviderEvent;
use tokio::sync::broadcast;

pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderEventBusConfig {
    pub buffer_capacity: usize,
}

impl Default for ProviderEventBusConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Fan-out channel from providers to every UI listener.
///
/// Late subscribers only see events published after they subscribed.
#[derive(Debug, Clone)]
pub struct ProviderEventBus {
    sender: broadcast::Sender<ProviderEvent>,
}

impl Default for ProviderEventBus {
    fn default() -> Self {
        Self::new(ProviderEventBusConfig::default())
    }
}

impl ProviderEventBus {
    pub fn new(config: ProviderEventBusConfig) -> Self {
        assert!(
            config.buffer_capacity > 0,
            "buffer_capacity must be greater than 0"
        );

        let (sender, _receiver) = broadcast::channel(config.buffer_capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns how many subscribers the event was delivered to.
    pub fn publish(&self, event: ProviderEvent) -> usize {
        tracing::debug!(event = ?event, "publishing provider event");
        self.sender.send(event).unwrap_or(0)
    }
}
