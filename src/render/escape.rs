use std::io::Cursor;

use rayon::prelude::*;

use crate::config::{FrameEncoding, FrameGeometry};
use crate::coordinator::TransformState;
use crate::foundation::error::{ReelError, ReelResult};

/// Axis-aligned region of the plane whose escaping points steer the zoom center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterestRegion {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl InterestRegion {
    /// Open-interval containment.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.xmin < x && x < self.xmax && self.ymin < y && y < self.ymax
    }
}

/// The seahorse-valley strip the zoom drifts towards.
pub const INTERESTING: InterestRegion = InterestRegion {
    xmin: -0.8,
    xmax: -0.7,
    ymin: 0.0,
    ymax: 0.1,
};

/// Pixels of one frame plus the best center candidate seen while rendering it.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    /// Straight RGBA8, row-major.
    pub rgba: Vec<u8>,
    pub candidate: Option<TransformState>,
}

impl RenderedFrame {
    /// Encode the pixels into the payload layout the encoder expects.
    pub fn into_payload(self, encoding: FrameEncoding) -> ReelResult<Vec<u8>> {
        match encoding {
            FrameEncoding::RawRgba => Ok(self.rgba),
            FrameEncoding::Png => {
                let img = image::RgbaImage::from_raw(self.width, self.height, self.rgba)
                    .ok_or_else(|| {
                        ReelError::validation("rgba buffer does not match frame dimensions")
                    })?;
                let mut out = Cursor::new(Vec::new());
                img.write_to(&mut out, image::ImageFormat::Png)
                    .map_err(|e| ReelError::worker(format!("png encode failed: {e}")))?;
                Ok(out.into_inner())
            }
        }
    }
}

/// Iterate `z -> z^2 + c` from zero. Returns the step at which `|z| > 2`, or `None` if the point
/// stays bounded for `max_iter` steps.
pub fn escape_iterations(cx: f64, cy: f64, max_iter: u32) -> Option<u32> {
    let (mut x, mut y) = (0.0f64, 0.0f64);
    let (mut xx, mut yy) = (0.0f64, 0.0f64);
    for n in 0..max_iter {
        if xx + yy > 4.0 {
            return Some(n);
        }
        let xy = x * y;
        x = xx - yy + cx;
        y = xy + xy + cy;
        xx = x * x;
        yy = y * y;
    }
    if xx + yy > 4.0 { Some(max_iter) } else { None }
}

/// Map an escape count onto a black → red → yellow → white ramp.
pub fn shade(iterations: Option<u32>, max_iter: u32) -> [u8; 4] {
    let Some(i) = iterations else {
        return [0, 0, 0, 255];
    };
    let i = i.max(1) as f64;
    let c = 3.0 * i.ln() / (max_iter as f64 - 1.0).ln();
    let ch = |v: f64| (255.0 * v).round().clamp(0.0, 255.0) as u8;
    if c < 1.0 {
        [ch(c), 0, 0, 255]
    } else if c < 2.0 {
        [255, ch(c - 1.0), 0, 255]
    } else {
        [255, 255, ch(c - 2.0), 255]
    }
}

/// Prefer the candidate furthest left, then furthest up.
fn pick_candidate(
    a: Option<TransformState>,
    b: Option<TransformState>,
) -> Option<TransformState> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => {
            if b.transform_x < a.transform_x
                || (b.transform_x == a.transform_x && b.transform_y > a.transform_y)
            {
                Some(b)
            } else {
                Some(a)
            }
        }
    }
}

struct RowCtx<'a> {
    geometry: &'a FrameGeometry,
    scale: f64,
    center: TransformState,
}

fn render_row(ctx: &RowCtx<'_>, iy: usize, row: &mut [u8]) -> Option<TransformState> {
    let g = ctx.geometry;
    let b = g.bounds;
    let w = g.width as usize;
    let h = g.height as usize;

    let y0 = b.ymin + (b.ymax - b.ymin) * iy as f64 / (h - 1) as f64;
    let y = y0 * ctx.scale + ctx.center.transform_y;

    let mut best = None;
    for (ix, px) in row.chunks_exact_mut(4).enumerate() {
        let x0 = b.xmin + (b.xmax - b.xmin) * ix as f64 / (w - 1) as f64;
        let x = x0 * ctx.scale + ctx.center.transform_x;

        let iters = escape_iterations(x, y, g.max_iterations);
        if iters.is_some_and(|i| i < g.max_iterations) && INTERESTING.contains(x, y) {
            let candidate = TransformState::new(x, y);
            if candidate.improves_on(&ctx.center) {
                best = pick_candidate(best, Some(candidate));
            }
        }
        px.copy_from_slice(&shade(iters, g.max_iterations));
    }
    best
}

/// Render one frame of the zoom.
///
/// Each pixel samples `(p / zoom²) + center`, where `p` walks the configured plane bounds. When
/// `parallel` is set, rows are rendered on the rayon global pool.
pub fn render_escape_frame(
    geometry: &FrameGeometry,
    zoom: f64,
    center: TransformState,
    parallel: bool,
) -> RenderedFrame {
    let row_len = geometry.width as usize * 4;
    let mut rgba = vec![0u8; geometry.rgba_len()];
    let ctx = RowCtx {
        geometry,
        scale: 1.0 / (zoom * zoom),
        center,
    };

    let candidate = if parallel {
        rgba.par_chunks_mut(row_len)
            .enumerate()
            .map(|(iy, row)| render_row(&ctx, iy, row))
            .reduce(|| None, pick_candidate)
    } else {
        rgba.chunks_mut(row_len)
            .enumerate()
            .map(|(iy, row)| render_row(&ctx, iy, row))
            .fold(None, pick_candidate)
    };

    RenderedFrame {
        width: geometry.width,
        height: geometry.height,
        rgba,
        candidate,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/escape.rs"]
mod tests;
