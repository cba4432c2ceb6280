//! Transition and edge search used by the previous/next navigation controls.
//!
//! Searches are strict: a transition exactly at the cursor is never "previous"
//! or "next". With no candidate the caller leaves the cursor where it is.

use shared::{Signal, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Any change of value.
    Any,
    Rising,
    Falling,
}

impl EdgeKind {
    fn matches(self, transition: &Transition<'_>) -> bool {
        match self {
            EdgeKind::Any => true,
            EdgeKind::Rising => transition.is_rising(),
            EdgeKind::Falling => transition.is_falling(),
        }
    }
}

/// All matching transition times across `signals`, sorted and deduplicated.
pub fn collect_transitions<'a>(
    signals: impl IntoIterator<Item = &'a Signal>,
    kind: EdgeKind,
) -> Vec<f64> {
    let mut times: Vec<f64> = signals
        .into_iter()
        .flat_map(|signal| signal.transitions())
        .filter(|transition| kind.matches(transition))
        .map(|transition| transition.time)
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup();
    times
}

/// Latest matching transition strictly before `time`.
pub fn find_previous<'a>(
    signals: impl IntoIterator<Item = &'a Signal>,
    time: f64,
    kind: EdgeKind,
) -> Option<f64> {
    signals
        .into_iter()
        .filter_map(|signal| {
            signal
                .transitions()
                .take_while(|transition| transition.time < time)
                .filter(|transition| kind.matches(transition))
                .last()
                .map(|transition| transition.time)
        })
        .max_by(f64::total_cmp)
}

/// Earliest matching transition strictly after `time`.
pub fn find_next<'a>(
    signals: impl IntoIterator<Item = &'a Signal>,
    time: f64,
    kind: EdgeKind,
) -> Option<f64> {
    signals
        .into_iter()
        .filter_map(|signal| {
            signal
                .transitions()
                .skip_while(|transition| transition.time <= time)
                .find(|transition| kind.matches(transition))
                .map(|transition| transition.time)
        })
        .min_by(f64::total_cmp)
}
