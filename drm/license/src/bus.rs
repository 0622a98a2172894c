use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::error::LicenseRequestError;
use crate::message::{LicenseRequestResult, MessageType, SessionToken};

/**
    Receiver of license request completions.

    `publish` is synchronous so it can be called from any task or thread.
*/
pub trait NotificationBus: Send + Sync {
    fn publish(&self, result: LicenseRequestResult);
}

impl<T: NotificationBus + ?Sized> NotificationBus for Arc<T> {
    fn publish(&self, result: LicenseRequestResult) {
        (**self).publish(result);
    }
}

impl NotificationBus for mpsc::UnboundedSender<LicenseRequestResult> {
    fn publish(&self, result: LicenseRequestResult) {
        if self.send(result).is_err() {
            warn!("license result receiver dropped");
        }
    }
}

/**
    Broadcast bus for license completions.

    Every subscriber sees every result. Results published while nobody is
    subscribed are dropped; slow subscribers get `RecvError::Lagged`.
*/
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<LicenseRequestResult>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LicenseRequestResult> {
        self.tx.subscribe()
    }
}

impl NotificationBus for EventBus {
    fn publish(&self, result: LicenseRequestResult) {
        let _ = self.tx.send(result);
    }
}

/**
    Single-use right to publish the terminal event of one request.

    Every method consumes the guard, so a request cannot complete twice.
    Dropping it without completing is a bug and is logged.
*/
#[must_use = "a license request must be completed exactly once"]
pub struct Completion {
    bus: Arc<dyn NotificationBus>,
    session_token: SessionToken,
    message_type: MessageType,
    fired: bool,
}

impl Completion {
    pub fn new(
        bus: Arc<dyn NotificationBus>,
        session_token: SessionToken,
        message_type: MessageType,
    ) -> Self {
        Self {
            bus,
            session_token,
            message_type,
            fired: false,
        }
    }

    pub fn complete(self, payload: Option<Bytes>) {
        let result = LicenseRequestResult::completed(
            self.session_token.clone(),
            self.message_type,
            payload,
        );
        self.deliver(result);
    }

    pub fn fail(self, error: LicenseRequestError) {
        let result =
            LicenseRequestResult::failed(self.session_token.clone(), self.message_type, error);
        self.deliver(result);
    }

    pub fn resolve(self, outcome: Result<Option<Bytes>, LicenseRequestError>) {
        match outcome {
            Ok(payload) => self.complete(payload),
            Err(error) => self.fail(error),
        }
    }

    fn deliver(mut self, result: LicenseRequestResult) {
        self.fired = true;
        self.bus.publish(result);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.fired {
            warn!(
                session = %self.session_token,
                message_type = %self.message_type,
                "license request dropped without a terminal event"
            );
        }
    }
}
