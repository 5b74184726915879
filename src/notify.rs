//! Fire-and-forget notifications
//!
//! Events go to NATS when a client is configured and to an optional
//! in-process channel. Without either they are only logged. Dispatch never
//! fails the caller.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct Dispatcher {
    nats: Option<async_nats::Client>,
    sink: Option<mpsc::UnboundedSender<DomainEvent>>,
}

impl Dispatcher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats, sink: None } }

    /// A dispatcher that also forwards every event to the returned receiver.
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { nats: None, sink: Some(tx) }, rx)
    }

    pub fn dispatch(&self, event: DomainEvent) {
        if let Some(sink) = &self.sink {
            if sink.send(event.clone()).is_err() {
                debug!("event sink closed");
            }
        }
        let Some(client) = self.nats.clone() else {
            info!(subject = event.subject(), "event {:?}", event);
            return;
        };
        tokio::spawn(async move {
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "cannot encode event");
                    return;
                }
            };
            if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                warn!(subject = event.subject(), error = %e, "event publish failed");
            }
        });
    }
}
