use super::surface::SurfaceId;
use indexmap::IndexSet;

/// Coalesces redraw requests and hands them out one animation frame at a time.
///
/// A surface queued several times before its frame is drawn once.
#[derive(Debug)]
pub struct RedrawScheduler {
    queue: IndexSet<SurfaceId>,
    per_frame: usize,
    frames: u64,
}

impl RedrawScheduler {
    pub fn new(per_frame: usize) -> Self {
        Self {
            queue: IndexSet::new(),
            per_frame: per_frame.max(1),
            frames: 0,
        }
    }

    /// Returns `false` when the surface was already waiting.
    pub fn queue(&mut self, surface: SurfaceId) -> bool {
        self.queue.insert(surface)
    }

    pub fn queue_all(&mut self, surfaces: impl IntoIterator<Item = SurfaceId>) {
        self.queue.extend(surfaces);
    }

    pub fn remove(&mut self, surface: SurfaceId) -> bool {
        self.queue.shift_remove(&surface)
    }

    /// Surfaces to draw in the next frame, oldest request first.
    pub fn take_batch(&mut self) -> Vec<SurfaceId> {
        if self.queue.is_empty() {
            return Vec::new();
        }
        self.frames += 1;
        let count = self.per_frame.min(self.queue.len());
        self.queue.drain(..count).collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
