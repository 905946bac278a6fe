use super::*;

fn ts(x: f64, y: f64) -> TransformState {
    TransformState::new(x, y)
}

#[test]
fn qualifying_candidate_replaces_state() {
    let mut store = TransformStore::default();
    let after = store.apply(ts(-0.75, 0.05));
    assert_eq!(after, ts(-0.75, 0.05));
    assert_eq!(store.current(), ts(-0.75, 0.05));
}

#[test]
fn candidate_must_improve_both_axes() {
    let mut store = TransformStore::new(ts(-0.75, 0.05));

    // x smaller but y not larger.
    assert_eq!(store.apply(ts(-0.76, 0.05)), ts(-0.75, 0.05));
    // y larger but x not smaller.
    assert_eq!(store.apply(ts(-0.75, 0.06)), ts(-0.75, 0.05));
    // Worse on both.
    assert_eq!(store.apply(ts(-0.70, 0.01)), ts(-0.75, 0.05));
    // Better on both.
    assert_eq!(store.apply(ts(-0.76, 0.06)), ts(-0.76, 0.06));
}

#[test]
fn nan_candidates_never_apply() {
    let mut store = TransformStore::new(ts(-0.75, 0.05));
    assert_eq!(store.apply(ts(f64::NAN, 0.09)), ts(-0.75, 0.05));
    assert_eq!(store.apply(ts(-0.79, f64::NAN)), ts(-0.75, 0.05));
}

#[test]
fn reapplying_the_same_candidate_is_harmless() {
    let mut store = TransformStore::default();
    let c = ts(-0.72, 0.03);
    assert_eq!(store.apply(c), c);
    assert_eq!(store.apply(c), c);
}

#[test]
fn stored_state_is_the_dominating_one_for_any_sequence() {
    let candidates = [
        ts(-0.71, 0.01),
        ts(-0.70, 0.09),
        ts(-0.78, 0.02),
        ts(-0.79, 0.03),
        ts(0.5, -0.5),
        ts(-0.795, 0.031),
    ];
    let mut store = TransformStore::default();
    for c in candidates {
        let before = store.current();
        let after = store.apply(c);
        if c.improves_on(&before) {
            assert_eq!(after, c);
        } else {
            assert_eq!(after, before);
        }
    }
    assert_eq!(store.current(), ts(-0.795, 0.031));
}

#[test]
fn local_coordinator_follows_store_rule() {
    let coord = LocalCoordinator::default();
    assert_eq!(coord.fetch().unwrap(), TransformState::default());
    assert_eq!(coord.propose(ts(-0.75, 0.05)).unwrap(), ts(-0.75, 0.05));
    assert_eq!(coord.propose(ts(-0.74, 0.06)).unwrap(), ts(-0.75, 0.05));
    assert_eq!(coord.current(), ts(-0.75, 0.05));
}

#[test]
fn wire_shape_uses_camel_case() {
    let json = serde_json::to_string(&ts(1.5, -2.0)).unwrap();
    assert_eq!(json, r#"{"transformX":1.5,"transformY":-2.0}"#);
}
