//! Per-row residual sky of a combined frame.

use common::{BitBuffer2, Buffer2};

use crate::combine::CombinedFrame;
use crate::math::polyfit::fit_clipped;

/// Rejection passes of each row fit.
const SKY_CLIP_ITERATIONS: usize = 3;

/// Fit a sigma-clipped, ivar-weighted polynomial in the spatial coordinate
/// to every spectral row of the sky-subtracted image.
///
/// Pixels set in `exclude` (object apertures) are left out. Rows without
/// usable pixels get a zero residual.
pub(crate) fn fit_residual_sky(
    frame: &CombinedFrame,
    exclude: Option<&BitBuffer2>,
    order: usize,
    sigrej: f64,
) -> Buffer2<f64> {
    let (width, height) = frame.shape();
    let mut residual = Buffer2::new_default(width, height);

    let mut xs = Vec::with_capacity(width);
    let mut ys = Vec::with_capacity(width);
    let mut ws = Vec::with_capacity(width);
    for y in 0..height {
        xs.clear();
        ys.clear();
        ws.clear();
        for x in 0..width {
            let idx = frame.sciimg.index_of(x, y);
            if !frame.is_good(idx) || exclude.is_some_and(|m| m.get(idx)) {
                continue;
            }
            xs.push(x as f64);
            ys.push(frame.sciimg[idx]);
            ws.push(frame.ivar[idx]);
        }
        let Some(fit) = fit_clipped(&xs, &ys, &ws, order, sigrej, SKY_CLIP_ITERATIONS) else {
            continue;
        };
        for (x, value) in residual.row_mut(y).iter_mut().enumerate() {
            *value = fit.poly.eval(x as f64);
        }
    }
    residual
}
