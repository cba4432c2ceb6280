//! Measured-size resolution for surfaces that are not laid out yet.
//!
//! A surface reporting a zero size is retried with exponential backoff. After
//! the configured number of attempts the fallback size is used instead, and
//! keeps being used until the surface is measurable or forgotten.

use super::surface::{Surface, SurfaceId};
use crate::clock::SharedClock;
use indexmap::{IndexMap, IndexSet};
use shared::SurfaceDims;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeStatus {
    Ready(SurfaceDims),
    /// Not measurable yet; ask again once `due` has passed.
    Retry { attempt: u32, due: Duration },
    Fallback(SurfaceDims),
}

impl SizeStatus {
    pub fn dims(self) -> Option<SurfaceDims> {
        match self {
            SizeStatus::Ready(dims) | SizeStatus::Fallback(dims) => Some(dims),
            SizeStatus::Retry { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingProbe {
    attempts: u32,
    due: Duration,
}

pub struct SurfaceSizer {
    clock: SharedClock,
    max_attempts: u32,
    base_delay: Duration,
    fallback: SurfaceDims,
    pending: IndexMap<SurfaceId, PendingProbe>,
    fallen_back: IndexSet<SurfaceId>,
}

impl SurfaceSizer {
    pub fn new(clock: SharedClock, max_attempts: u32, base_delay: Duration, fallback: SurfaceDims) -> Self {
        Self {
            clock,
            max_attempts,
            base_delay,
            fallback,
            pending: IndexMap::new(),
            fallen_back: IndexSet::new(),
        }
    }

    pub fn resolve(&mut self, id: SurfaceId, surface: &dyn Surface) -> SizeStatus {
        let (width, height) = surface.measured_size();
        let pixel_ratio = surface.device_pixel_ratio();
        let measured = SurfaceDims::new(width, height).with_pixel_ratio(pixel_ratio);
        if measured.is_ready() {
            self.forget(id);
            return SizeStatus::Ready(measured);
        }
        if self.fallen_back.contains(&id) {
            return SizeStatus::Fallback(self.fallback.with_pixel_ratio(pixel_ratio));
        }

        let attempts = self.pending.get(&id).map_or(0, |retry| retry.attempts);
        if attempts >= self.max_attempts {
            self.pending.shift_remove(&id);
            self.fallen_back.insert(id);
            log::warn!(
                "Surface {id:?} still has no size after {attempts} attempts, using {}x{}",
                self.fallback.width,
                self.fallback.height
            );
            return SizeStatus::Fallback(self.fallback.with_pixel_ratio(pixel_ratio));
        }

        let delay = self.base_delay.saturating_mul(1u32 << attempts.min(16));
        let due = self.clock.now() + delay;
        self.pending.insert(
            id,
            PendingProbe {
                attempts: attempts + 1,
                due,
            },
        );
        log::debug!("Surface {id:?} not laid out, retry #{} in {delay:?}", attempts + 1);
        SizeStatus::Retry {
            attempt: attempts + 1,
            due,
        }
    }

    /// Surfaces whose retry time has come.
    pub fn due(&self) -> Vec<SurfaceId> {
        let now = self.clock.now();
        self.pending
            .iter()
            .filter(|(_, retry)| retry.due <= now)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drops retry state for `id`; the next `resolve` starts from scratch.
    pub fn forget(&mut self, id: SurfaceId) {
        self.pending.shift_remove(&id);
        self.fallen_back.shift_remove(&id);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
