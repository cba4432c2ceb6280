//! Row cells: name, value readout, radix selector and waveform surface.

use crate::visualizer::cache::RenderCache;
use crate::visualizer::canvas::rendering::{RenderOutcome, TraceRequest, WaveformRenderer};
use crate::visualizer::canvas::surface::{Surface, SurfaceId};
use crate::visualizer::timeline::TimeRange;
use shared::{Signal, SurfaceDims, VarFormat};
use std::fmt;
use std::rc::Rc;

/// Everything a cell may need to draw itself for one frame.
pub struct RenderContext<'a> {
    pub renderer: &'a mut WaveformRenderer,
    pub cache: &'a mut RenderCache,
    pub visible: TimeRange,
    pub cursor: f64,
    pub format: VarFormat,
    /// Resolved size of the waveform surface.
    pub dims: SurfaceDims,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellContent<'a> {
    Text(&'a str),
    Format(VarFormat),
    Drawn(RenderOutcome),
    Destroyed,
}

pub enum Cell {
    Name { label: String },
    Value { text: String },
    Radix { format: VarFormat },
    Waveform { id: SurfaceId, surface: Option<Box<dyn Surface>> },
}

impl Cell {
    pub fn render<'s>(&'s mut self, signal: &Signal, context: &mut RenderContext<'_>) -> CellContent<'s> {
        match self {
            Cell::Name { label } => CellContent::Text(label),
            Cell::Value { text } => CellContent::Text(text),
            Cell::Radix { format } => CellContent::Format(*format),
            Cell::Waveform { id, surface } => {
                let Some(surface) = surface.as_deref_mut() else {
                    return CellContent::Destroyed;
                };
                log::trace!("Drawing {} into {id:?}", signal.name);
                let request = TraceRequest {
                    signal,
                    visible: context.visible,
                    cursor: context.cursor,
                    format: context.format,
                    dims: context.dims,
                };
                CellContent::Drawn(context.renderer.draw(surface, &request, context.cache))
            }
        }
    }

    /// Refreshes readouts for a new cursor time or radix. Returns whether the cell changed.
    pub fn update(&mut self, signal: &Signal, time: f64, format: VarFormat) -> bool {
        match self {
            Cell::Value { text } => {
                let readout = signal.value_at(time).get_formatted(&format);
                if *text == readout {
                    return false;
                }
                *text = readout;
                true
            }
            Cell::Radix { format: current } => {
                if *current == format {
                    return false;
                }
                *current = format;
                true
            }
            Cell::Name { .. } | Cell::Waveform { .. } => false,
        }
    }

    /// Detaches a waveform surface. Returns its id the first time.
    pub fn destroy(&mut self) -> Option<SurfaceId> {
        match self {
            Cell::Waveform { id, surface } => {
                let mut surface = surface.take()?;
                surface.detach();
                Some(*id)
            }
            _ => None,
        }
    }
}

/// One signal's row: cells in column order.
pub struct Row {
    pub(crate) signal: Rc<Signal>,
    pub(crate) position: usize,
    cells: Vec<Cell>,
    surface_id: SurfaceId,
}

impl Row {
    pub fn new(signal: Rc<Signal>, surface_id: SurfaceId, surface: Box<dyn Surface>) -> Self {
        let cells = vec![
            Cell::Name {
                label: signal.name.clone(),
            },
            Cell::Value {
                text: String::new(),
            },
            Cell::Radix {
                format: VarFormat::default(),
            },
            Cell::Waveform {
                id: surface_id,
                surface: Some(surface),
            },
        ];
        Self {
            signal,
            position: 0,
            cells,
            surface_id,
        }
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn name(&self) -> &str {
        &self.signal.name
    }

    /// Index of the row in the full visible-signal list.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn surface(&self) -> Option<&dyn Surface> {
        self.cells.iter().find_map(|cell| match cell {
            Cell::Waveform { surface, .. } => surface.as_deref(),
            _ => None,
        })
    }

    pub fn value_text(&self) -> Option<&str> {
        self.cells.iter().find_map(|cell| match cell {
            Cell::Value { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn update(&mut self, time: f64, format: VarFormat) -> bool {
        let signal = self.signal.clone();
        let mut changed = false;
        for cell in &mut self.cells {
            changed |= cell.update(&signal, time, format);
        }
        changed
    }

    /// Draws the waveform cell.
    pub fn render_waveform(&mut self, context: &mut RenderContext<'_>) -> CellContent<'_> {
        let signal = self.signal.clone();
        match self
            .cells
            .iter_mut()
            .find(|cell| matches!(cell, Cell::Waveform { .. }))
        {
            Some(cell) => match cell.render(&signal, context) {
                CellContent::Drawn(outcome) => CellContent::Drawn(outcome),
                _ => CellContent::Destroyed,
            },
            None => CellContent::Destroyed,
        }
    }

    pub fn destroy(&mut self) -> Vec<SurfaceId> {
        self.cells.iter_mut().filter_map(Cell::destroy).collect()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("signal", &self.signal.name)
            .field("position", &self.position)
            .field("surface_id", &self.surface_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::visualizer::cache::default_store_configs;
    use crate::visualizer::canvas::rendering::Theme;
    use crate::visualizer::canvas::surface::RecordingSurface;
    use shared::{NO_DATA, TimePoint};

    fn signal() -> Rc<Signal> {
        Rc::new(Signal::new(
            "top.cpu.state",
            vec![
                TimePoint::new(0.0, "0000"),
                TimePoint::new(10.0, "1010"),
                TimePoint::new(20.0, "1111"),
            ],
        ))
    }

    #[test]
    fn value_cell_follows_time_and_format() {
        let signal = signal();
        let mut cell = Cell::Value {
            text: String::new(),
        };
        assert!(cell.update(&signal, 15.0, VarFormat::Binary));
        assert!(matches!(&cell, Cell::Value { text } if text == "1010"));
        assert!(!cell.update(&signal, 16.0, VarFormat::Binary));
        assert!(cell.update(&signal, 16.0, VarFormat::Hexadecimal));
        assert!(matches!(&cell, Cell::Value { text } if text == "a"));
    }

    #[test]
    fn empty_signal_reads_no_data() {
        let signal = Signal::new("top.idle", Vec::new());
        let mut cell = Cell::Value {
            text: String::new(),
        };
        cell.update(&signal, 5.0, VarFormat::Unsigned);
        assert!(matches!(&cell, Cell::Value { text } if text == NO_DATA));
    }

    #[test]
    fn destroy_detaches_surface_once() {
        let surface = RecordingSurface::new("top.cpu.state", 200.0, 24.0);
        let state = surface.state();
        let mut row = Row::new(signal(), SurfaceId(3), Box::new(surface));

        assert_eq!(row.destroy(), vec![SurfaceId(3)]);
        assert!(state.borrow().detached);
        assert!(row.destroy().is_empty());
    }

    #[test]
    fn waveform_cell_draws_at_resolved_size() {
        let clock = ManualClock::new();
        let mut renderer = WaveformRenderer::new(Theme::Dark);
        let mut cache = RenderCache::new(default_store_configs(), Rc::new(clock));
        let surface = RecordingSurface::new("top.cpu.state", 320.0, 24.0).with_pixel_ratio(2.0);
        let state = surface.state();
        let mut row = Row::new(signal(), SurfaceId(1), Box::new(surface));
        let mut context = RenderContext {
            renderer: &mut renderer,
            cache: &mut cache,
            visible: TimeRange::new(0.0, 20.0),
            cursor: 5.0,
            format: VarFormat::Hexadecimal,
            dims: SurfaceDims::new(320.0, 24.0).with_pixel_ratio(2.0),
        };

        let drawn = row.render_waveform(&mut context);
        assert!(matches!(drawn, CellContent::Drawn(outcome) if !outcome.cached));
        assert_eq!(state.borrow().backing, (640, 48));
        assert_eq!(row.surface().map(|s| s.measured_size()), Some((320.0, 24.0)));

        row.destroy();
        assert_eq!(row.render_waveform(&mut context), CellContent::Destroyed);
    }
}
