//! Change notices and the subscriber side of delivery.

use crate::error::SubscriberError;
use crate::types::StateField;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

/// One field change, delivered to every subscriber and then discarded.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    field_name: &'static str,
    new_value: serde_json::Value,
}

impl ChangeNotice {
    pub fn new(field: StateField, new_value: serde_json::Value) -> Self {
        Self {
            field_name: field.name(),
            new_value,
        }
    }

    pub fn field_name(&self) -> &str {
        self.field_name
    }

    pub fn new_value(&self) -> &serde_json::Value {
        &self.new_value
    }
}

/// Receives change notices from a container.
///
/// Delivery is synchronous from the container's point of view. Handlers
/// that need to do slow work should hand the notice off (see
/// [`ChannelSubscriber`]) instead of blocking the mutation path.
pub trait Subscriber: Send + Sync {
    fn on_change(&self, notice: &ChangeNotice) -> Result<(), SubscriberError>;
}

/// Adapts a closure into a [`Subscriber`].
pub struct FnSubscriber<F>(F);

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&ChangeNotice) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_change(&self, notice: &ChangeNotice) -> Result<(), SubscriberError> {
        (self.0)(notice)
    }
}

/// Wrap `f` as a subscriber.
pub fn subscriber_fn<F>(f: F) -> FnSubscriber<F>
where
    F: Fn(&ChangeNotice) -> Result<(), SubscriberError> + Send + Sync,
{
    FnSubscriber(f)
}

/// Forwards notices into a bounded channel for consumption elsewhere.
///
/// A full or disconnected channel is reported as a delivery failure; the
/// notice is lost for this subscriber only.
pub struct ChannelSubscriber {
    sender: Sender<ChangeNotice>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiving end of its channel.
    pub fn new(buffer_size: usize) -> (Self, NoticeReceiver) {
        let (sender, receiver) = bounded(buffer_size.max(1));
        (Self { sender }, NoticeReceiver { receiver })
    }
}

impl Subscriber for ChannelSubscriber {
    fn on_change(&self, notice: &ChangeNotice) -> Result<(), SubscriberError> {
        match self.sender.try_send(notice.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SubscriberError::new("notice buffer full")),
            Err(TrySendError::Disconnected(_)) => {
                Err(SubscriberError::new("notice receiver disconnected"))
            }
        }
    }
}

/// Receiving end of a [`ChannelSubscriber`].
pub struct NoticeReceiver {
    receiver: Receiver<ChangeNotice>,
}

impl NoticeReceiver {
    /// Receive the next notice (blocking).
    pub fn recv(&self) -> Result<ChangeNotice, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notice (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeNotice, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChangeNotice, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<ChangeNotice> {
        self.receiver.try_iter().collect()
    }
}
