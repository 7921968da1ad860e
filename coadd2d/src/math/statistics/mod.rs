//! Statistical functions: median, MAD, robust sigma.


/// MAD (Median Absolute Deviation) to standard deviation conversion factor.
///
/// For a normal distribution, σ ≈ 1.4826 × MAD.
pub const MAD_TO_SIGMA: f64 = 1.482_602_218_505_602;

/// Convert MAD to standard deviation (assuming normal distribution).
#[inline]
pub fn mad_to_sigma(mad: f64) -> f64 {
    mad * MAD_TO_SIGMA
}

/// Calculate the median of f64 values in-place.
///
/// Mutates the input buffer (partial sort via quickselect).
/// Returns `None` for an empty slice.
pub fn median_mut(data: &mut [f64]) -> Option<f64> {
    let len = data.len();
    if len == 0 {
        return None;
    }
    let mid = len / 2;

    let (left_part, median, _) = data.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *median;
    if len & 1 == 1 {
        return Some(upper);
    }
    let lower = left_part.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((lower + upper) * 0.5)
}

/// Median of a slice without touching it.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut scratch = values.to_vec();
    median_mut(&mut scratch)
}

/// Median and MAD computed together. Mutates the input buffer.
pub fn median_and_mad_mut(data: &mut [f64]) -> Option<(f64, f64)> {
    let median = median_mut(data)?;
    for v in data.iter_mut() {
        *v = (*v - median).abs();
    }
    let mad = median_mut(data)?;
    Some((median, mad))
}

/// Robust standard deviation of `values` around their median.
pub fn robust_sigma(values: &[f64]) -> Option<f64> {
    let mut scratch = values.to_vec();
    median_and_mad_mut(&mut scratch).map(|(_, mad)| mad_to_sigma(mad))
}
