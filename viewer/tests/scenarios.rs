use futures::StreamExt;
use serde_json::{Value, json};
use shared::SurfaceDims;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use viewer::visualizer::cache::{EvictionPolicy, RenderCache, SetOptions, StoreConfig, StoreKey};
use viewer::visualizer::canvas::RecordingFactory;
use viewer::visualizer::hierarchy::{HierarchyTree, Visibility};
use viewer::visualizer::timeline::{EdgeKind, MIN_ZOOM, TimeRange};
use viewer::{EventKind, ManualClock, Viewer, ViewerConfig, ViewerEvent};

const DIMS: StoreKey<SurfaceDims> = StoreKey::new("dims");

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn viewer_with(payload: &Value) -> (Viewer, RecordingFactory) {
    init_logging();
    let factory = RecordingFactory::new(400.0, 24.0);
    let mut viewer = Viewer::new(
        ViewerConfig::default(),
        Box::new(factory.clone()),
        Rc::new(ManualClock::new()),
    );
    viewer.set_viewport_height(480.0);
    viewer.load_data(payload).unwrap();
    (viewer, factory)
}

fn two_signal_dataset() -> Value {
    json!({
        "signals": [
            { "name": "A", "data": [{ "time": 0, "value": "0" }, { "time": 100, "value": "1" }] },
            { "name": "B", "data": [{ "time": 50, "value": "0" }, { "time": 200, "value": "1" }] }
        ],
        "timescale": { "value": 1, "unit": "ns" }
    })
}

fn names(viewer: &Viewer) -> Vec<String> {
    viewer.rows().signals().iter().map(|signal| signal.name.clone()).collect()
}

fn cache(max_size: usize, policy: EvictionPolicy) -> RenderCache {
    RenderCache::new(
        BTreeMap::from([("dims".to_string(), StoreConfig::new(max_size, policy))]),
        Rc::new(ManualClock::new()),
    )
}

#[test]
fn total_range_spans_every_signal_and_zoom_halves_the_window() {
    let (mut viewer, _) = viewer_with(&two_signal_dataset());
    assert_eq!(viewer.viewport().total(), TimeRange::new(0.0, 200.0));

    assert!(viewer.set_zoom(2.0, None));
    let visible = viewer.viewport().visible();
    assert_eq!(visible.duration(), 100.0);
    assert_eq!(visible, TimeRange::new(50.0, 150.0));
    assert!(!viewer.set_zoom(2.0, None));
}

#[test]
fn zoom_levels_stay_within_bounds() {
    let (mut viewer, _) = viewer_with(&two_signal_dataset());
    viewer.set_max_zoom(64.0);
    let total = viewer.viewport().total();

    for (level, center) in [(0.25, None), (3.0, Some(190.0)), (1e9, Some(5.0)), (7.5, None), (1.0, None)] {
        viewer.set_zoom(level, center);
        let zoom = viewer.viewport().zoom_level();
        let visible = viewer.viewport().visible();
        assert!((MIN_ZOOM..=64.0).contains(&zoom), "zoom {zoom}");
        assert!((visible.duration() - total.duration() / zoom).abs() < 1e-9);
        assert!(total.start <= visible.start && visible.end <= total.end);
    }
}

#[test]
fn pan_there_and_back_restores_the_window() {
    let (mut viewer, _) = viewer_with(&two_signal_dataset());
    viewer.set_zoom(4.0, None);
    let original = viewer.viewport().visible();
    assert_eq!(original, TimeRange::new(75.0, 125.0));

    assert!(viewer.pan(20.0));
    assert!(viewer.pan(-20.0));
    assert_eq!(viewer.viewport().visible(), original);

    assert!(viewer.pan(1000.0));
    assert_eq!(viewer.viewport().visible(), TimeRange::new(150.0, 200.0));
    assert!(!viewer.pan(10.0));
    viewer.pan(-1000.0);
    assert_eq!(viewer.viewport().visible(), TimeRange::new(0.0, 50.0));
}

#[test]
fn cursor_reads_held_value_and_steps_back_to_the_transition() {
    let (mut viewer, _) = viewer_with(&json!({
        "signals": [{ "name": "A", "data": [
            { "time": 0, "value": "0" }, { "time": 10, "value": "1" }, { "time": 20, "value": "0" }
        ]}]
    }));

    assert_eq!(viewer.move_cursor(15.0), 15.0);
    assert_eq!(viewer.value_readout("A").as_deref(), Some("1"));
    assert_eq!(viewer.rows().row("A").and_then(|row| row.value_text()), Some("1"));

    assert_eq!(viewer.previous_transition(EdgeKind::Any), Some(10.0));
    assert_eq!(viewer.cursor().current_time(), 10.0);
    assert_eq!(viewer.previous_transition_of("A", EdgeKind::Any), None);
    assert_eq!(viewer.cursor().current_time(), 10.0);
}

#[test]
fn repeated_cursor_moves_fan_out_once() {
    let (mut viewer, factory) = viewer_with(&two_signal_dataset());
    while viewer.pending_redraws() > 0 {
        viewer.on_animation_frame();
    }
    let changes = Rc::new(Cell::new(0));
    let counter = changes.clone();
    viewer.bus().subscribe(EventKind::CursorChanged, move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    let row_a = factory.surface_by_label("A").unwrap();
    let frames = row_a.borrow().frames;

    assert_eq!(viewer.move_cursor(-40.0), 0.0);
    assert_eq!(viewer.move_cursor(250.0), 200.0);
    assert_eq!(viewer.move_cursor(250.0), 200.0);
    assert_eq!(viewer.move_cursor(200.0), 200.0);

    assert_eq!(changes.get(), 1);
    assert_eq!(row_a.borrow().frames, frames + 1);
}

#[test]
fn hiding_the_root_hides_everything_and_showing_restores_pre_order() {
    let (mut viewer, _) = viewer_with(&json!({
        "signals": [
            { "name": "top.cpu.alu", "data": [{ "time": 0, "value": "0" }] },
            { "name": "top.mem", "data": [{ "time": 0, "value": "0" }] },
            { "name": "io", "data": [{ "time": 5, "value": "1" }] },
            { "name": "top.cpu.pc", "data": [{ "time": 0, "value": "00" }] }
        ]
    }));
    let order = vec!["top.cpu.alu", "top.cpu.pc", "top.mem", "io"];
    assert_eq!(names(&viewer), order);

    assert!(viewer.hide_all());
    assert!(viewer.tree().collect_visible(HierarchyTree::ROOT).is_empty());
    assert_eq!(viewer.rows().mounted_count(), 0);

    assert!(viewer.show_all());
    let collected: Vec<String> = viewer
        .tree()
        .collect_visible(HierarchyTree::ROOT)
        .iter()
        .map(|signal| signal.name.clone())
        .collect();
    assert_eq!(collected, order);
    assert_eq!(viewer.rows().mounted_count(), 4);
}

#[test]
fn leaf_toggle_restores_ancestor_state() {
    let (mut viewer, _) = viewer_with(&json!({
        "signals": [
            { "name": "top.cpu.alu", "data": [] },
            { "name": "top.cpu.pc", "data": [] },
            { "name": "top.mem", "data": [] }
        ]
    }));
    viewer.set_visible("top.mem", false);

    let tree = viewer.tree();
    let ancestors = [
        tree.find("top.cpu").unwrap(),
        tree.find("top").unwrap(),
        HierarchyTree::ROOT,
    ];
    let before: Vec<_> = ancestors.iter().map(|id| tree.visibility(*id)).collect();
    assert_eq!(before[1], Some(Visibility::Mixed));

    assert!(viewer.toggle_visible("top.cpu.alu"));
    assert_eq!(viewer.tree().visibility(ancestors[0]), Some(Visibility::Mixed));
    assert_eq!(names(&viewer), vec!["top.cpu.pc"]);

    assert!(viewer.toggle_visible("top.cpu.alu"));
    let after: Vec<_> = ancestors.iter().map(|id| viewer.tree().visibility(*id)).collect();
    assert_eq!(after, before);
    assert_eq!(names(&viewer), vec!["top.cpu.alu", "top.cpu.pc"]);
}

#[test]
fn dimensions_round_trip_and_overflow_evicts_one_key() {
    init_logging();
    let mut dims = cache(3, EvictionPolicy::Lru);
    let size = SurfaceDims::new(100.0, 40.0);
    dims.set(DIMS, "sigA", size, SetOptions::default()).unwrap();
    assert_eq!(dims.get(DIMS, "sigA"), Some(size));

    for (policy, survivor_reads, evicted) in [
        (EvictionPolicy::Lru, vec!["k0", "k2"], "k1"),
        (EvictionPolicy::Fifo, vec!["k0", "k2"], "k0"),
        (EvictionPolicy::Lfu, vec!["k0", "k0", "k1"], "k2"),
    ] {
        let mut store = cache(3, policy);
        for key in ["k0", "k1", "k2"] {
            store.set(DIMS, key, size, SetOptions::default()).unwrap();
        }
        for key in survivor_reads {
            store.get(DIMS, key);
        }
        store.set(DIMS, "k3", size, SetOptions::default()).unwrap();

        let present: Vec<&str> = ["k0", "k1", "k2", "k3"]
            .into_iter()
            .filter(|key| store.has(DIMS, key))
            .collect();
        assert_eq!(present.len(), 3, "{policy:?}");
        assert!(!present.contains(&evicted), "{policy:?} kept {evicted}");
        assert_eq!(store.stats("dims").map(|stats| stats.evictions), Some(1));
    }
}

#[test]
fn failed_load_keeps_previous_dataset() {
    let (mut viewer, _) = viewer_with(&two_signal_dataset());
    viewer.set_zoom(2.0, None);
    assert!(viewer.load_data(&json!({ "timescale": { "value": 1, "unit": "ns" } })).is_err());
    assert_eq!(viewer.dataset().len(), 2);
    assert_eq!(viewer.viewport().visible(), TimeRange::new(50.0, 150.0));
}

#[tokio::test]
async fn cursor_changes_reach_async_subscribers() {
    let (mut viewer, _) = viewer_with(&two_signal_dataset());
    let mut changes = viewer.bus().stream(EventKind::CursorChanged);

    viewer.move_cursor(5.0);
    viewer.move_cursor(5.0);
    viewer.move_cursor(120.0);

    assert_eq!(changes.next().await, Some(ViewerEvent::CursorChanged { time: 5.0 }));
    assert_eq!(changes.next().await, Some(ViewerEvent::CursorChanged { time: 120.0 }));
}
