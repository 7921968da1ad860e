//! Time scales: UTC to TT via the leap-second table.

/// Modified Julian Date offset.
pub const MJD_OFFSET: f64 = 2_400_000.5;
/// Julian Date of J2000.0.
pub const J2000: f64 = 2_451_545.0;
pub const DAYS_PER_CENTURY: f64 = 36_525.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// TT - TAI in seconds.
const TT_MINUS_TAI: f64 = 32.184;

/// `(first MJD, TAI - UTC)` for every leap second since 1972.
const LEAP_SECONDS: &[(u32, f64)] = &[
    (41317, 10.0),
    (41499, 11.0),
    (41683, 12.0),
    (42048, 13.0),
    (42413, 14.0),
    (42778, 15.0),
    (43144, 16.0),
    (43509, 17.0),
    (43874, 18.0),
    (44239, 19.0),
    (44786, 20.0),
    (45151, 21.0),
    (45516, 22.0),
    (46247, 23.0),
    (47161, 24.0),
    (47892, 25.0),
    (48257, 26.0),
    (48804, 27.0),
    (49169, 28.0),
    (49534, 29.0),
    (50083, 30.0),
    (50630, 31.0),
    (51179, 32.0),
    (53736, 33.0),
    (54832, 34.0),
    (56109, 35.0),
    (57204, 36.0),
    (57754, 37.0),
];

/// TAI - UTC in seconds at `mjd_utc`. Dates before 1972 use the first entry.
pub fn tai_minus_utc(mjd_utc: f64) -> f64 {
    LEAP_SECONDS
        .iter()
        .rev()
        .find(|(start, _)| mjd_utc >= *start as f64)
        .map_or(LEAP_SECONDS[0].1, |(_, dat)| *dat)
}

/// Julian Date in TT of a UTC Modified Julian Date.
///
/// TDB differs from TT by less than 2 ms and is taken as equal.
pub fn jd_tt(mjd_utc: f64) -> f64 {
    let offset = (tai_minus_utc(mjd_utc) + TT_MINUS_TAI) / SECONDS_PER_DAY;
    mjd_utc + MJD_OFFSET + offset
}

/// Julian Date in UT1, approximated by UTC.
pub fn jd_ut1(mjd_utc: f64) -> f64 {
    mjd_utc + MJD_OFFSET
}

/// Julian centuries since J2000.0.
#[inline]
pub fn centuries_since_j2000(jd: f64) -> f64 {
    (jd - J2000) / DAYS_PER_CENTURY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leap_second_lookup() {
        assert_eq!(tai_minus_utc(40000.0), 10.0);
        assert_eq!(tai_minus_utc(57753.99), 36.0);
        assert_eq!(tai_minus_utc(57754.0), 37.0);
        assert_eq!(tai_minus_utc(60000.0), 37.0);
    }

    #[test]
    fn test_tt_offset_2017() {
        let mjd = 57783.269661;
        let dt = (jd_tt(mjd) - jd_ut1(mjd)) * SECONDS_PER_DAY;
        assert!((dt - 69.184).abs() < 1e-4, "TT-UTC {}", dt);
    }
}
