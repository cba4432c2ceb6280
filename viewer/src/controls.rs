//! User-facing controls. Each action runs exactly one core operation.

use crate::viewer::Viewer;
use crate::visualizer::timeline::EdgeKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    MoveToStart,
    MoveToEnd,
    PreviousTransition,
    NextTransition,
    PreviousRisingEdge,
    NextRisingEdge,
    PreviousFallingEdge,
    NextFallingEdge,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ZoomToSelection { start: f64, end: f64 },
    PanLeft,
    PanRight,
    ShowAll,
    HideAll,
}

impl ControlAction {
    /// Keyboard bindings shown next to the timeline controls.
    pub fn from_shortcut(key: char, shift: bool) -> Option<Self> {
        let action = match (key.to_ascii_lowercase(), shift) {
            ('w', _) => ControlAction::ZoomIn,
            ('s', _) => ControlAction::ZoomOut,
            ('a', _) => ControlAction::PanLeft,
            ('d', _) => ControlAction::PanRight,
            ('r', _) => ControlAction::ResetZoom,
            ('q', true) => ControlAction::PreviousTransition,
            ('e', true) => ControlAction::NextTransition,
            _ => return None,
        };
        Some(action)
    }
}

impl Viewer {
    /// Runs a control. Returns whether any state changed.
    pub fn apply(&mut self, action: ControlAction) -> bool {
        log::debug!("Control {action:?}");
        let before = self.cursor().current_time();
        let moved = |after: f64| after != before;
        match action {
            ControlAction::MoveToStart => moved(self.move_cursor_to_start()),
            ControlAction::MoveToEnd => moved(self.move_cursor_to_end()),
            ControlAction::PreviousTransition => self.previous_transition(EdgeKind::Any).is_some(),
            ControlAction::NextTransition => self.next_transition(EdgeKind::Any).is_some(),
            ControlAction::PreviousRisingEdge => self.previous_transition(EdgeKind::Rising).is_some(),
            ControlAction::NextRisingEdge => self.next_transition(EdgeKind::Rising).is_some(),
            ControlAction::PreviousFallingEdge => self.previous_transition(EdgeKind::Falling).is_some(),
            ControlAction::NextFallingEdge => self.next_transition(EdgeKind::Falling).is_some(),
            ControlAction::ZoomIn => self.zoom_in(),
            ControlAction::ZoomOut => self.zoom_out(),
            ControlAction::ResetZoom => self.reset_zoom(),
            ControlAction::ZoomToSelection { start, end } => self.zoom_to_range(start, end),
            ControlAction::PanLeft => self.pan_step(-1.0),
            ControlAction::PanRight => self.pan_step(1.0),
            ControlAction::ShowAll => self.show_all(),
            ControlAction::HideAll => self.hide_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ViewerConfig;
    use crate::visualizer::canvas::surface::RecordingFactory;
    use crate::visualizer::timeline::TimeRange;
    use serde_json::json;
    use std::rc::Rc;

    fn viewer() -> Viewer {
        let mut viewer = Viewer::new(
            ViewerConfig::default(),
            Box::new(RecordingFactory::new(400.0, 24.0)),
            Rc::new(ManualClock::new()),
        );
        viewer.set_viewport_height(240.0);
        viewer
            .load_data(&json!({
                "signals": [
                    { "name": "top.clk", "data": [
                        { "time": 0, "value": "0" }, { "time": 10, "value": "1" },
                        { "time": 20, "value": "0" }, { "time": 30, "value": "1" }
                    ]},
                    { "name": "top.bus", "data": [
                        { "time": 0, "value": "00" }, { "time": 15, "value": "11" }, { "time": 100, "value": "01" }
                    ]}
                ]
            }))
            .unwrap();
        viewer
    }

    #[test]
    fn cursor_controls() {
        let mut viewer = viewer();
        assert!(!viewer.apply(ControlAction::MoveToStart));
        assert!(viewer.apply(ControlAction::MoveToEnd));
        assert_eq!(viewer.cursor().current_time(), 100.0);

        assert!(viewer.apply(ControlAction::PreviousFallingEdge));
        assert_eq!(viewer.cursor().current_time(), 20.0);
        assert!(viewer.apply(ControlAction::PreviousTransition));
        assert_eq!(viewer.cursor().current_time(), 15.0);
        assert!(viewer.apply(ControlAction::PreviousRisingEdge));
        assert_eq!(viewer.cursor().current_time(), 10.0);
        assert!(viewer.apply(ControlAction::NextFallingEdge));
        assert_eq!(viewer.cursor().current_time(), 20.0);
        assert!(viewer.apply(ControlAction::NextRisingEdge));
        assert_eq!(viewer.cursor().current_time(), 30.0);
        assert!(viewer.apply(ControlAction::NextTransition));
        assert_eq!(viewer.cursor().current_time(), 100.0);
        assert!(!viewer.apply(ControlAction::NextTransition));
    }

    #[test]
    fn viewport_controls() {
        let mut viewer = viewer();
        assert!(!viewer.apply(ControlAction::ZoomOut));
        assert!(viewer.apply(ControlAction::ZoomIn));
        assert_eq!(viewer.viewport().visible(), TimeRange::new(25.0, 75.0));
        assert!(viewer.apply(ControlAction::PanRight));
        assert_eq!(viewer.viewport().visible(), TimeRange::new(37.5, 87.5));
        assert!(viewer.apply(ControlAction::ResetZoom));
        assert_eq!(viewer.viewport().visible(), TimeRange::new(0.0, 100.0));
        assert!(viewer.apply(ControlAction::ZoomToSelection { start: 60.0, end: 40.0 }));
        assert_eq!(viewer.viewport().visible(), TimeRange::new(40.0, 60.0));
        assert!(viewer.apply(ControlAction::PanLeft));
        assert_eq!(viewer.viewport().visible(), TimeRange::new(35.0, 55.0));
    }

    #[test]
    fn visibility_controls() {
        let mut viewer = viewer();
        assert!(!viewer.apply(ControlAction::ShowAll));
        assert!(viewer.apply(ControlAction::HideAll));
        assert_eq!(viewer.rows().signal_count(), 0);
        assert!(viewer.apply(ControlAction::ShowAll));
        assert_eq!(viewer.rows().signal_count(), 2);
    }

    #[test]
    fn shortcuts_follow_keyboard_hints() {
        assert_eq!(ControlAction::from_shortcut('W', false), Some(ControlAction::ZoomIn));
        assert_eq!(ControlAction::from_shortcut('d', true), Some(ControlAction::PanRight));
        assert_eq!(ControlAction::from_shortcut('q', true), Some(ControlAction::PreviousTransition));
        assert_eq!(ControlAction::from_shortcut('q', false), None);
        assert_eq!(ControlAction::from_shortcut('x', false), None);
    }
}
