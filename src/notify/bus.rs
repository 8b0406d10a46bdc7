// Privacy Guard — In-Memory Event Bus
//
// Multi-producer, multi-consumer fan-out on `tokio::sync::broadcast`.
// Async consumers (the socket bridge) call `recv`; blocking consumers (a
// decision cache in the same process) use the `EventSource` impl, which
// drives the receiver on a private current-thread runtime.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{EventPublisher, EventSource, EventSubscriber, NotifyError, PolicyEvent};

/// Events buffered per subscriber before it starts lagging.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

pub struct InMemoryBus {
    sender: broadcast::Sender<PolicyEvent>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber. It sees only events published afterwards.
    pub fn subscribe_channel(&self) -> BusSubscription {
        debug!("New bus subscription");
        BusSubscription {
            receiver: self.sender.subscribe(),
            runtime: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for InMemoryBus {
    fn publish(&self, event: PolicyEvent) -> usize {
        let signal = event.signal();
        let package = event.package().to_string();

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(signal, %package, receivers, "Event published");
                receivers
            }
            Err(_) => {
                debug!(signal, %package, "Event dropped (no subscribers)");
                0
            }
        }
    }
}

impl EventSubscriber for InMemoryBus {
    fn subscribe(&self) -> Result<Box<dyn EventSource>, NotifyError> {
        Ok(Box::new(self.subscribe_channel()))
    }
}

/// One subscriber's view of the bus.
pub struct BusSubscription {
    receiver: broadcast::Receiver<PolicyEvent>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl BusSubscription {
    /// Next event, skipping over any that were missed by lagging.
    pub async fn recv(&mut self) -> Result<PolicyEvent, NotifyError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Closed) => return Err(NotifyError::Closed),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, events dropped");
                }
            }
        }
    }
}

impl EventSource for BusSubscription {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<PolicyEvent>, NotifyError> {
        if self.runtime.is_none() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            self.runtime = Some(runtime);
        }
        let Some(runtime) = self.runtime.take() else {
            return Err(NotifyError::Closed);
        };
        let result = runtime.block_on(async {
            match tokio::time::timeout(timeout, self.recv()).await {
                Ok(Ok(event)) => Ok(Some(event)),
                Ok(Err(e)) => Err(e),
                Err(_elapsed) => Ok(None),
            }
        });
        self.runtime = Some(runtime);
        result
    }
}
