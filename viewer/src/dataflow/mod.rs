//! Publish/subscribe plumbing shared by every viewer component.

pub mod event_bus;
pub mod rate_limit;
pub mod relay;

pub use event_bus::{EventBus, EventKind, SubscriptionId, ViewerEvent};
pub use rate_limit::{Debounce, Debounced, Throttle, Throttled, debounce, throttle};
pub use relay::EventStream;
