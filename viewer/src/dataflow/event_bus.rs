//! Typed publish/subscribe hub scoped to one viewer instance.
//!
//! Components never hold references to each other; they publish what changed
//! and whoever cares subscribes. Delivery is synchronous and in registration
//! order. A handler that fails or panics is logged and skipped, the remaining
//! handlers still run.

use super::relay::{EventStream, Relay};
use crate::visualizer::canvas::surface::SurfaceId;
use crate::visualizer::hierarchy::{NodeId, Visibility};
use crate::visualizer::timeline::time_domain::TimeRange;
use indexmap::IndexMap;
use shared::VarFormat;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CursorChanged,
    ZoomChanged,
    ViewportChanged,
    RedrawRequested,
    VisibilityChanged,
    DragStart,
    DragUpdate,
    DragEnd,
    DatasetLoaded,
    RadixChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    CursorChanged {
        time: f64,
    },
    ZoomChanged {
        level: f64,
    },
    ViewportChanged {
        visible: TimeRange,
    },
    /// `None` asks every surface to redraw.
    RedrawRequested {
        surface: Option<SurfaceId>,
    },
    VisibilityChanged {
        node: NodeId,
        path: String,
        visibility: Visibility,
    },
    DragStart {
        surface: SurfaceId,
        time: f64,
    },
    DragUpdate {
        surface: SurfaceId,
        start: f64,
        time: f64,
    },
    DragEnd {
        surface: SurfaceId,
        start: f64,
        time: f64,
    },
    DatasetLoaded {
        signals: usize,
        total: TimeRange,
    },
    RadixChanged {
        signal: String,
        format: VarFormat,
    },
}

impl ViewerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ViewerEvent::CursorChanged { .. } => EventKind::CursorChanged,
            ViewerEvent::ZoomChanged { .. } => EventKind::ZoomChanged,
            ViewerEvent::ViewportChanged { .. } => EventKind::ViewportChanged,
            ViewerEvent::RedrawRequested { .. } => EventKind::RedrawRequested,
            ViewerEvent::VisibilityChanged { .. } => EventKind::VisibilityChanged,
            ViewerEvent::DragStart { .. } => EventKind::DragStart,
            ViewerEvent::DragUpdate { .. } => EventKind::DragUpdate,
            ViewerEvent::DragEnd { .. } => EventKind::DragEnd,
            ViewerEvent::DatasetLoaded { .. } => EventKind::DatasetLoaded,
            ViewerEvent::RadixChanged { .. } => EventKind::RadixChanged,
        }
    }
}

pub type EventHandler = Rc<dyn Fn(&ViewerEvent) -> anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: IndexMap<EventKind, Vec<Subscriber>>,
    relays: Vec<Relay>,
    published: u64,
    failures: u64,
}

/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ViewerEvent) -> anyhow::Result<()> + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.entry(kind).or_default().push(Subscriber {
            id,
            handler: Rc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(subscribers) = registry.subscribers.get_mut(&kind) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        before != subscribers.len()
    }

    /// Async alternative to [`subscribe`](Self::subscribe).
    pub fn stream(&self, kind: EventKind) -> EventStream {
        let (relay, stream) = Relay::new(kind);
        self.registry.borrow_mut().relays.push(relay);
        stream
    }

    pub fn publish(&self, event: ViewerEvent) {
        let kind = event.kind();
        // Snapshot so handlers may subscribe, unsubscribe or publish reentrantly.
        let handlers: Vec<(SubscriptionId, EventHandler)> = {
            let mut registry = self.registry.borrow_mut();
            registry.published += 1;
            registry.relays.retain(|relay| relay.forward(&event));
            registry
                .subscribers
                .get(&kind)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .map(|subscriber| (subscriber.id, subscriber.handler.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (id, handler) in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
            let failed = match outcome {
                Ok(Ok(())) => false,
                Ok(Err(error)) => {
                    log::error!("Event handler {id:?} for {kind:?} failed: {error:#}");
                    true
                }
                Err(_) => {
                    log::error!("Event handler {id:?} for {kind:?} panicked");
                    true
                }
            };
            if failed {
                self.registry.borrow_mut().failures += 1;
            }
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry
            .borrow()
            .subscribers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn published_count(&self) -> u64 {
        self.registry.borrow().published
    }

    pub fn failure_count(&self) -> u64 {
        self.registry.borrow().failures
    }

    /// Drops every subscriber and stream, used when the viewer is torn down.
    pub fn clear(&self) {
        let mut registry = self.registry.borrow_mut();
        registry.subscribers.clear();
        registry.relays.clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("EventBus")
            .field("kinds", &registry.subscribers.len())
            .field("relays", &registry.relays.len())
            .field("published", &registry.published)
            .finish()
    }
}
