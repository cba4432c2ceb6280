//! Drawing-surface contract and the display lists painted into surfaces.
//!
//! The viewer never creates page chrome. Hosts hand it a [`SurfaceFactory`]
//! and it asks for one surface per mounted row plus one for the time ruler.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

pub type Rgba = (u8, u8, u8, f32);

/// 2D immediate-mode drawing target with CSS-size and backing-buffer size.
pub trait Surface {
    /// Laid-out CSS size; `(0.0, 0.0)` while the surface is not attached yet.
    fn measured_size(&self) -> (f64, f64);
    fn device_pixel_ratio(&self) -> f64;
    fn backing_size(&self) -> (u32, u32);
    fn set_backing_size(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn set_stroke(&mut self, color: Rgba, line_width: f64);
    fn set_fill(&mut self, color: Rgba);
    fn begin_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn stroke(&mut self);
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn fill_text(&mut self, text: &str, x: f64, y: f64);
    /// Removes the surface from the page; it is not drawn into afterwards.
    fn detach(&mut self);
}

pub trait SurfaceFactory {
    fn create(&mut self, id: SurfaceId, label: &str) -> Box<dyn Surface>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    SetStroke { color: Rgba, line_width: f64 },
    SetFill { color: Rgba },
    BeginPath,
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    Stroke,
    FillRect { x: f64, y: f64, width: f64, height: f64 },
    FillText { text: String, x: f64, y: f64 },
}

/// Recorded drawing commands that can be replayed into any surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn set_stroke(&mut self, color: Rgba, line_width: f64) {
        self.commands.push(DrawCommand::SetStroke { color, line_width });
    }

    pub fn set_fill(&mut self, color: Rgba) {
        self.commands.push(DrawCommand::SetFill { color });
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.commands.push(DrawCommand::FillRect {
                x,
                y,
                width,
                height,
            });
        }
    }

    pub fn fill_text(&mut self, text: impl Into<String>, x: f64, y: f64) {
        self.commands.push(DrawCommand::FillText {
            text: text.into(),
            x,
            y,
        });
    }

    /// A single stroked polyline.
    pub fn polyline(&mut self, points: &[(f64, f64)]) {
        let Some((&(x, y), rest)) = points.split_first() else {
            return;
        };
        self.commands.push(DrawCommand::BeginPath);
        self.commands.push(DrawCommand::MoveTo { x, y });
        for &(x, y) in rest {
            self.commands.push(DrawCommand::LineTo { x, y });
        }
        self.commands.push(DrawCommand::Stroke);
    }

    pub fn replay(&self, surface: &mut dyn Surface) {
        for command in &self.commands {
            match command {
                DrawCommand::SetStroke { color, line_width } => surface.set_stroke(*color, *line_width),
                DrawCommand::SetFill { color } => surface.set_fill(*color),
                DrawCommand::BeginPath => surface.begin_path(),
                DrawCommand::MoveTo { x, y } => surface.move_to(*x, *y),
                DrawCommand::LineTo { x, y } => surface.line_to(*x, *y),
                DrawCommand::Stroke => surface.stroke(),
                DrawCommand::FillRect {
                    x,
                    y,
                    width,
                    height,
                } => surface.fill_rect(*x, *y, *width, *height),
                DrawCommand::FillText { text, x, y } => surface.fill_text(text, *x, *y),
            }
        }
    }
}

/// Horizontal pointer interaction in surface-local CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Click { x: f64 },
    Wheel { x: f64, delta_y: f64, shift: bool },
    DragStart { x: f64 },
    DragMove { x: f64 },
    DragEnd { x: f64 },
}

// ===== HEADLESS SURFACES =====

/// Observable state of a [`RecordingSurface`], shared with whoever created it.
#[derive(Debug, Clone)]
pub struct RecordingState {
    pub label: String,
    pub measured: (f64, f64),
    pub pixel_ratio: f64,
    pub backing: (u32, u32),
    /// Commands since the last `clear`.
    pub commands: Vec<DrawCommand>,
    pub frames: usize,
    pub detached: bool,
}

impl RecordingState {
    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DrawCommand::FillText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Surface that records what is drawn into it instead of painting pixels.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    state: Rc<RefCell<RecordingState>>,
}

impl RecordingSurface {
    pub fn new(label: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(RecordingState {
                label: label.into(),
                measured: (width, height),
                pixel_ratio: 1.0,
                backing: (0, 0),
                commands: Vec::new(),
                frames: 0,
                detached: false,
            })),
        }
    }

    pub fn with_pixel_ratio(self, pixel_ratio: f64) -> Self {
        self.state.borrow_mut().pixel_ratio = pixel_ratio;
        self
    }

    pub fn state(&self) -> Rc<RefCell<RecordingState>> {
        self.state.clone()
    }

    fn record(&self, command: DrawCommand) {
        self.state.borrow_mut().commands.push(command);
    }
}

impl Surface for RecordingSurface {
    fn measured_size(&self) -> (f64, f64) {
        self.state.borrow().measured
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.state.borrow().pixel_ratio
    }

    fn backing_size(&self) -> (u32, u32) {
        self.state.borrow().backing
    }

    fn set_backing_size(&mut self, width: u32, height: u32) {
        self.state.borrow_mut().backing = (width, height);
    }

    fn clear(&mut self) {
        let mut state = self.state.borrow_mut();
        state.commands.clear();
        state.frames += 1;
    }

    fn set_stroke(&mut self, color: Rgba, line_width: f64) {
        self.record(DrawCommand::SetStroke { color, line_width });
    }

    fn set_fill(&mut self, color: Rgba) {
        self.record(DrawCommand::SetFill { color });
    }

    fn begin_path(&mut self) {
        self.record(DrawCommand::BeginPath);
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.record(DrawCommand::MoveTo { x, y });
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.record(DrawCommand::LineTo { x, y });
    }

    fn stroke(&mut self) {
        self.record(DrawCommand::Stroke);
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.record(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
        });
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        self.record(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
        });
    }

    fn detach(&mut self) {
        self.state.borrow_mut().detached = true;
    }
}

/// Factory for [`RecordingSurface`]s that keeps a handle to each one it made.
#[derive(Debug, Clone)]
pub struct RecordingFactory {
    size: Rc<RefCell<(f64, f64)>>,
    pixel_ratio: f64,
    created: Rc<RefCell<IndexMap<SurfaceId, Rc<RefCell<RecordingState>>>>>,
}

impl RecordingFactory {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            size: Rc::new(RefCell::new((width, height))),
            pixel_ratio: 1.0,
            created: Rc::new(RefCell::new(IndexMap::new())),
        }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    /// Measured size given to surfaces created from now on.
    pub fn set_size(&self, width: f64, height: f64) {
        *self.size.borrow_mut() = (width, height);
    }

    pub fn surface(&self, id: SurfaceId) -> Option<Rc<RefCell<RecordingState>>> {
        self.created.borrow().get(&id).cloned()
    }

    pub fn surface_by_label(&self, label: &str) -> Option<Rc<RefCell<RecordingState>>> {
        self.created
            .borrow()
            .values()
            .rev()
            .find(|state| state.borrow().label == label)
            .cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.borrow().len()
    }
}

impl SurfaceFactory for RecordingFactory {
    fn create(&mut self, id: SurfaceId, label: &str) -> Box<dyn Surface> {
        let (width, height) = *self.size.borrow();
        let surface = RecordingSurface::new(label, width, height).with_pixel_ratio(self.pixel_ratio);
        self.created.borrow_mut().insert(id, surface.state());
        Box::new(surface)
    }
}
