//! Virtualized signal rows.
//!
//! Only rows intersecting the scrolled viewport (plus a buffer margin) are
//! mounted. Unmounted rows go to a pool keyed by signal name, so scrolling back
//! reuses their surfaces; rows pushed out of the pool have their surfaces detached.

pub mod cell;

pub use cell::{Cell, CellContent, RenderContext, Row};

use crate::visualizer::canvas::surface::{SurfaceFactory, SurfaceId};
use indexmap::IndexMap;
use shared::{Signal, VarFormat};
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowStats {
    pub mounts: u64,
    pub unmounts: u64,
    pub rows_created: u64,
    pub rows_reused: u64,
    pub rows_destroyed: u64,
    pub rebuilds: u64,
    pub incremental_updates: u64,
}

/// What a reconcile pass did, in terms the surrounding context has to act on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowChange {
    pub mounted: Vec<(String, SurfaceId)>,
    pub unmounted: Vec<(String, SurfaceId)>,
    /// Surfaces detached because their row left the pool.
    pub destroyed: Vec<SurfaceId>,
}

impl RowChange {
    pub fn is_empty(&self) -> bool {
        self.mounted.is_empty() && self.unmounted.is_empty() && self.destroyed.is_empty()
    }

    fn absorb(&mut self, other: RowChange) {
        self.mounted.extend(other.mounted);
        self.unmounted.extend(other.unmounted);
        self.destroyed.extend(other.destroyed);
    }
}

enum ListEdit {
    Unchanged,
    Inserted(usize),
    Removed(usize),
    Replaced,
}

pub struct VirtualRowManager {
    row_height: f64,
    buffer_rows: usize,
    pool_capacity: usize,
    scroll_top: f64,
    viewport_height: f64,
    order: Vec<Rc<Signal>>,
    mounted: IndexMap<String, Row>,
    /// Least recently unmounted first.
    pool: IndexMap<String, Row>,
    surfaces: HashMap<SurfaceId, String>,
    factory: Box<dyn SurfaceFactory>,
    next_surface: u64,
    stats: RowStats,
}

impl VirtualRowManager {
    /// Surface ids below this value are reserved for non-row surfaces.
    pub const FIRST_ROW_SURFACE: u64 = 1;

    pub fn new(factory: Box<dyn SurfaceFactory>, row_height: f64, buffer_rows: usize, pool_capacity: usize) -> Self {
        Self {
            row_height,
            buffer_rows,
            pool_capacity,
            scroll_top: 0.0,
            viewport_height: 0.0,
            order: Vec::new(),
            mounted: IndexMap::new(),
            pool: IndexMap::new(),
            surfaces: HashMap::new(),
            factory,
            next_surface: Self::FIRST_ROW_SURFACE,
            stats: RowStats::default(),
        }
    }

    /// Gives the factory to a caller that needs a non-row surface.
    pub fn factory_mut(&mut self) -> &mut dyn SurfaceFactory {
        self.factory.as_mut()
    }

    pub fn stats(&self) -> RowStats {
        self.stats
    }

    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn total_height(&self) -> f64 {
        self.order.len() as f64 * self.row_height
    }

    pub fn signal_count(&self) -> usize {
        self.order.len()
    }

    pub fn signals(&self) -> &[Rc<Signal>] {
        &self.order
    }

    /// Vertical offset of row `index` inside the scroll container.
    pub fn row_top(&self, index: usize) -> f64 {
        index as f64 * self.row_height
    }

    /// Index range of rows to mount: those intersecting the viewport plus the buffer.
    pub fn visible_range(&self) -> Range<usize> {
        if self.row_height <= 0.0 || self.order.is_empty() {
            return 0..0;
        }
        let first = (self.scroll_top / self.row_height).floor() as usize;
        let last = ((self.scroll_top + self.viewport_height) / self.row_height).ceil() as usize;
        let start = first.saturating_sub(self.buffer_rows).min(self.order.len());
        let end = last.saturating_add(self.buffer_rows).min(self.order.len());
        start..end.max(start)
    }

    /// Mounted rows in position order.
    pub fn mounted_rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.mounted.values()
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.len()
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        self.mounted.contains_key(name)
    }

    pub fn row(&self, name: &str) -> Option<&Row> {
        self.mounted.get(name)
    }

    pub fn row_for_surface(&self, id: SurfaceId) -> Option<&Row> {
        let name = self.surfaces.get(&id)?;
        self.mounted.get(name)
    }

    pub fn row_for_surface_mut(&mut self, id: SurfaceId) -> Option<&mut Row> {
        let name = self.surfaces.get(&id)?;
        self.mounted.get_mut(name)
    }

    pub fn mounted_surfaces(&self) -> Vec<SurfaceId> {
        self.mounted.values().map(Row::surface_id).collect()
    }

    /// Replaces the ordered list of rendered signals.
    ///
    /// A single insertion or removal only touches the affected row; any other
    /// change unmounts the whole window and mounts it again from the pool.
    pub fn set_signals(&mut self, signals: Vec<Rc<Signal>>) -> RowChange {
        let edit = classify_edit(&self.order, &signals);
        self.order = signals;
        self.scroll_top = self
            .scroll_top
            .min((self.total_height() - self.viewport_height).max(0.0));
        match edit {
            ListEdit::Unchanged => RowChange::default(),
            ListEdit::Inserted(index) | ListEdit::Removed(index) => {
                self.stats.incremental_updates += 1;
                log::debug!("Incremental row update at {index}");
                self.reconcile()
            }
            ListEdit::Replaced => {
                if !self.mounted.is_empty() {
                    self.stats.rebuilds += 1;
                }
                let mut change = RowChange::default();
                let names: Vec<String> = self.mounted.keys().cloned().collect();
                for name in names {
                    change.absorb(self.unmount(&name));
                }
                change.absorb(self.reconcile());
                change
            }
        }
    }

    pub fn set_scroll_top(&mut self, scroll_top: f64) -> RowChange {
        let max_scroll = (self.total_height() - self.viewport_height).max(0.0);
        let scroll_top = if scroll_top.is_finite() {
            scroll_top.clamp(0.0, max_scroll)
        } else {
            0.0
        };
        if scroll_top == self.scroll_top {
            return RowChange::default();
        }
        self.scroll_top = scroll_top;
        self.reconcile()
    }

    pub fn set_viewport_height(&mut self, height: f64) -> RowChange {
        if !height.is_finite() || height < 0.0 || height == self.viewport_height {
            return RowChange::default();
        }
        self.viewport_height = height;
        self.reconcile()
    }

    /// Mounts exactly the rows in [`Self::visible_range`] and unmounts the rest.
    pub fn reconcile(&mut self) -> RowChange {
        let range = self.visible_range();
        let wanted: Vec<Rc<Signal>> = self.order[range.clone()].to_vec();
        let mut change = RowChange::default();

        let stale: Vec<String> = self
            .mounted
            .keys()
            .filter(|name| !wanted.iter().any(|signal| &signal.name == *name))
            .cloned()
            .collect();
        for name in stale {
            change.absorb(self.unmount(&name));
        }

        let mut ordered = IndexMap::with_capacity(wanted.len());
        for (offset, signal) in wanted.into_iter().enumerate() {
            let position = range.start + offset;
            let mut row = match self.mounted.shift_remove(&signal.name) {
                Some(row) => row,
                None => {
                    let row = self.mount(signal.clone());
                    change.mounted.push((signal.name.clone(), row.surface_id()));
                    row
                }
            };
            row.position = position;
            row.signal = signal.clone();
            ordered.insert(signal.name.clone(), row);
        }
        self.mounted = ordered;

        change.destroyed.extend(self.trim_pool());
        change
    }

    fn mount(&mut self, signal: Rc<Signal>) -> Row {
        self.stats.mounts += 1;
        if let Some(row) = self.pool.shift_remove(&signal.name) {
            self.stats.rows_reused += 1;
            return row;
        }
        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;
        let surface = self.factory.create(id, &signal.name);
        self.surfaces.insert(id, signal.name.clone());
        self.stats.rows_created += 1;
        Row::new(signal, id, surface)
    }

    fn unmount(&mut self, name: &str) -> RowChange {
        let mut change = RowChange::default();
        if let Some(row) = self.mounted.shift_remove(name) {
            self.stats.unmounts += 1;
            change.unmounted.push((name.to_string(), row.surface_id()));
            self.pool.insert(name.to_string(), row);
        }
        change
    }

    fn trim_pool(&mut self) -> Vec<SurfaceId> {
        let mut destroyed = Vec::new();
        while self.pool.len() > self.pool_capacity {
            let Some((_, mut row)) = self.pool.shift_remove_index(0) else {
                break;
            };
            self.surfaces.remove(&row.surface_id());
            self.stats.rows_destroyed += 1;
            destroyed.extend(row.destroy());
        }
        destroyed
    }

    /// Refreshes every mounted row's readout for the cursor time.
    pub fn update_readouts(&mut self, time: f64, mut format_for: impl FnMut(&str) -> VarFormat) -> usize {
        self.mounted
            .values_mut()
            .map(|row| {
                let format = format_for(row.name());
                row.update(time, format)
            })
            .filter(|changed| *changed)
            .count()
    }

    /// Detaches every surface and forgets all rows.
    pub fn reset(&mut self) -> RowChange {
        let mut change = RowChange::default();
        for (name, mut row) in self.mounted.drain(..) {
            change.unmounted.push((name, row.surface_id()));
            change.destroyed.extend(row.destroy());
        }
        for (_, mut row) in self.pool.drain(..) {
            change.destroyed.extend(row.destroy());
        }
        self.surfaces.clear();
        self.order.clear();
        self.scroll_top = 0.0;
        change
    }
}

fn classify_edit(old: &[Rc<Signal>], new: &[Rc<Signal>]) -> ListEdit {
    let same = |a: &Rc<Signal>, b: &Rc<Signal>| a.name == b.name;
    if old.len() == new.len() {
        return if old.iter().zip(new).all(|(a, b)| same(a, b)) {
            ListEdit::Unchanged
        } else {
            ListEdit::Replaced
        };
    }
    let (longer, shorter) = if new.len() > old.len() { (new, old) } else { (old, new) };
    if longer.len() != shorter.len() + 1 {
        return ListEdit::Replaced;
    }
    let split = longer
        .iter()
        .zip(shorter)
        .position(|(a, b)| !same(a, b))
        .unwrap_or(shorter.len());
    if !longer[split + 1..].iter().zip(&shorter[split..]).all(|(a, b)| same(a, b)) {
        return ListEdit::Replaced;
    }
    if new.len() > old.len() {
        ListEdit::Inserted(split)
    } else {
        ListEdit::Removed(split)
    }
}
