use super::*;
use crate::config::PlaneBounds;

fn tiny(bounds: PlaneBounds) -> FrameGeometry {
    FrameGeometry {
        width: 2,
        height: 2,
        bounds,
        ..FrameGeometry::default()
    }
}

#[test]
fn origin_never_escapes_and_far_points_escape_fast() {
    assert_eq!(escape_iterations(0.0, 0.0, 250), None);
    assert_eq!(escape_iterations(-1.0, 0.0, 250), None);
    assert_eq!(escape_iterations(2.0, 2.0, 250), Some(1));
}

#[test]
fn shade_ramp_endpoints() {
    assert_eq!(shade(None, 250), [0, 0, 0, 255]);
    assert_eq!(shade(Some(1), 250), [0, 0, 0, 255]);
    assert_eq!(shade(Some(249), 250), [255, 255, 255, 255]);
}

#[test]
fn frame_has_expected_size_and_is_opaque() {
    let g = FrameGeometry {
        width: 16,
        height: 8,
        ..FrameGeometry::default()
    };
    let frame = render_escape_frame(&g, 1.0, TransformState::default(), false);
    assert_eq!(frame.rgba.len(), 16 * 8 * 4);
    assert!(frame.rgba.chunks_exact(4).all(|px| px[3] == 255));
}

#[test]
fn parallel_and_serial_rendering_agree() {
    let g = FrameGeometry {
        width: 32,
        height: 24,
        max_iterations: 64,
        ..FrameGeometry::default()
    };
    let center = TransformState::new(-0.75, 0.07);
    let a = render_escape_frame(&g, 3.0, center, false);
    let b = render_escape_frame(&g, 3.0, center, true);
    assert_eq!(a, b);
}

#[test]
fn escaping_points_in_the_valley_become_candidates() {
    // Both left-column samples sit on the x = -0.75 valley line and escape quickly.
    let g = tiny(PlaneBounds {
        xmin: -0.75,
        xmax: -0.6,
        ymin: 0.05,
        ymax: 0.09,
    });
    let frame = render_escape_frame(&g, 1.0, TransformState::default(), false);
    let c = frame.candidate.expect("candidate");
    assert_eq!(c.transform_x, -0.75);
    assert!(c.transform_y > 0.08);
}

#[test]
fn no_candidate_when_nothing_moves_left_of_center() {
    let center = TransformState::new(-0.75, 0.07);
    let g = FrameGeometry {
        width: 8,
        height: 8,
        bounds: PlaneBounds {
            xmin: 0.0,
            xmax: 1.0,
            ymin: -1.0,
            ymax: 1.0,
        },
        ..FrameGeometry::default()
    };
    let frame = render_escape_frame(&g, 1000.0, center, false);
    assert_eq!(frame.candidate, None);
}

#[test]
fn candidates_always_improve_on_the_center() {
    let center = TransformState::new(-0.75, 0.07);
    let g = FrameGeometry {
        width: 16,
        height: 16,
        ..FrameGeometry::default()
    };
    let frame = render_escape_frame(&g, 1000.0, center, true);
    if let Some(c) = frame.candidate {
        assert!(c.improves_on(&center));
        assert!(INTERESTING.contains(c.transform_x, c.transform_y));
    }
}

#[test]
fn png_payload_round_trips_dimensions() {
    let g = FrameGeometry {
        width: 6,
        height: 4,
        ..FrameGeometry::default()
    };
    let frame = render_escape_frame(&g, 1.0, TransformState::default(), false);
    let png = frame.clone().into_payload(FrameEncoding::Png).unwrap();
    assert_eq!(&png[1..4], b"PNG");
    let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (6, 4));
    assert_eq!(decoded.into_raw(), frame.rgba);

    let raw = frame.clone().into_payload(FrameEncoding::RawRgba).unwrap();
    assert_eq!(raw, frame.rgba);
}
