//! Stream side of the event bus.
//!
//! Async consumers that prefer `StreamExt::next().await` over callbacks take an
//! [`EventStream`] from [`EventBus::stream`](super::EventBus::stream). Every
//! publish of the subscribed kind is forwarded through an unbounded channel.

use super::event_bus::{EventKind, ViewerEvent};
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

pub type EventStream = UnboundedReceiver<ViewerEvent>;

#[derive(Debug)]
pub(crate) struct Relay {
    kind: EventKind,
    sender: UnboundedSender<ViewerEvent>,
}

impl Relay {
    pub(crate) fn new(kind: EventKind) -> (Self, EventStream) {
        let (sender, receiver) = unbounded();
        (Relay { kind, sender }, receiver)
    }

    /// Forwards `event` if it matches this relay's kind.
    ///
    /// Returns `false` once the receiving stream has been dropped so the bus can
    /// forget the relay.
    pub(crate) fn forward(&self, event: &ViewerEvent) -> bool {
        if event.kind() != self.kind {
            return !self.sender.is_closed();
        }
        self.sender.unbounded_send(event.clone()).is_ok()
    }
}
