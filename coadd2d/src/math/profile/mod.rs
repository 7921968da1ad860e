//! One-dimensional profile operations: smoothing, peaks, cross-correlation.


/// Convolve `values` with a normalized Gaussian of standard deviation `sigma`.
///
/// The kernel is truncated at 4σ. Near the edges the kernel is renormalized
/// over the taps that fall inside the profile, so a constant profile stays
/// constant.
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || values.is_empty() {
        return values.to_vec();
    }

    let radius = (4.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|d| (-0.5 * (d as f64 / sigma).powi(2)).exp())
        .collect();

    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let mut sum = 0.0;
            let mut norm = 0.0;
            for (k, &kw) in kernel.iter().enumerate() {
                let j = i + k as isize - radius;
                if (0..n).contains(&j) {
                    sum += kw * values[j as usize];
                    norm += kw;
                }
            }
            sum / norm
        })
        .collect()
}

/// Sub-sample offset of the vertex of the parabola through three samples.
///
/// Returns a value in `[-0.5, 0.5]` relative to the centre sample, or `0.0`
/// when the samples are collinear.
pub fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

/// Indices of local maxima sorted by decreasing value.
///
/// Plateaus report their first sample. Peaks closer than `min_separation`
/// to a stronger peak are dropped.
pub fn local_maxima(values: &[f64], min_separation: f64) -> Vec<usize> {
    let n = values.len();
    let mut peaks: Vec<usize> = (1..n.saturating_sub(1))
        .filter(|&i| values[i] > values[i - 1] && values[i] >= values[i + 1])
        .collect();
    peaks.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

    let mut kept: Vec<usize> = Vec::with_capacity(peaks.len());
    for p in peaks {
        if kept
            .iter()
            .all(|&k| (k as f64 - p as f64).abs() >= min_separation)
        {
            kept.push(p);
        }
    }
    kept
}

/// Shift of `other` relative to `reference` maximizing their correlation.
///
/// A feature at position `x` in `reference` appears at `x + shift` in
/// `other`. Lags up to `max_shift` are searched and the best integer lag is
/// refined with a parabola. Returns `None` when the profiles carry no signal.
pub fn cross_correlation_shift(reference: &[f64], other: &[f64], max_shift: usize) -> Option<f64> {
    let n = reference.len().min(other.len());
    if n < 3 {
        return None;
    }
    let reference = demean(&reference[..n]);
    let other = demean(&other[..n]);

    let max_shift = max_shift.min(n - 1) as isize;
    let correlation = |lag: isize| -> f64 {
        (0..n as isize)
            .filter_map(|i| {
                let j = i + lag;
                (0..n as isize)
                    .contains(&j)
                    .then(|| reference[i as usize] * other[j as usize])
            })
            .sum()
    };

    let scores: Vec<(isize, f64)> = (-max_shift..=max_shift)
        .map(|lag| (lag, correlation(lag)))
        .collect();
    let best = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
        .map(|(idx, _)| idx)?;
    if scores[best].1 <= 0.0 {
        return None;
    }

    let lag = scores[best].0 as f64;
    if best == 0 || best + 1 == scores.len() {
        return Some(lag);
    }
    Some(lag + parabolic_offset(scores[best - 1].1, scores[best].1, scores[best + 1].1))
}

fn demean(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let mean = if finite.is_empty() {
        0.0
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    };
    values
        .iter()
        .map(|&v| if v.is_finite() { v - mean } else { 0.0 })
        .collect()
}
