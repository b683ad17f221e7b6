//! Conversions between microseconds, servo degrees, and timer ticks.
//!
//! Everything here is integer-only and saturating: these run on the main-line side of the
//! servo bus and must never panic or overflow.

/// Largest servo angle accepted by the degree-based API.
pub const MAX_DEGREES: u16 = 180;

/// Convert microseconds to ticks of a timer running at `ticks_per_us`.
#[must_use]
pub const fn us_to_ticks(us: u32, ticks_per_us: u32) -> u32 {
    us.saturating_mul(ticks_per_us)
}

/// Convert ticks of a timer running at `ticks_per_us` back to whole microseconds.
///
/// Truncates, so `ticks_to_us(us_to_ticks(us, r), r) == us` for any rate.
#[must_use]
pub const fn ticks_to_us(ticks: u32, ticks_per_us: u32) -> u32 {
    match ticks.checked_div(ticks_per_us) {
        Some(us) => us,
        None => 0,
    }
}

/// Re-map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Integer, truncating toward zero, and not clamped: values outside the input range land
/// outside the output range. An empty input range maps everything to `out_min`.
#[must_use]
pub fn map_range(value: i64, in_min: i64, in_max: i64, out_min: i64, out_max: i64) -> i64 {
    let span = value
        .saturating_sub(in_min)
        .saturating_mul(out_max.saturating_sub(out_min));
    span.checked_div(in_max.saturating_sub(in_min))
        .unwrap_or(0)
        .saturating_add(out_min)
}

/// Map an angle in `[0, 180]` linearly onto `[min_ticks, max_ticks]`.
///
/// Angles above 180 are treated as 180.
#[must_use]
pub fn degrees_to_ticks(degrees: u16, min_ticks: u32, max_ticks: u32) -> u32 {
    let degrees = degrees.min(MAX_DEGREES);
    let ticks = map_range(
        i64::from(degrees),
        0,
        i64::from(MAX_DEGREES),
        i64::from(min_ticks),
        i64::from(max_ticks),
    );
    clamp_to_u32(ticks, min_ticks, max_ticks)
}

/// Map a tick count in `[min_ticks, max_ticks]` back to an angle in `[0, 180]`.
#[must_use]
pub fn ticks_to_degrees(ticks: u32, min_ticks: u32, max_ticks: u32) -> u16 {
    let degrees = map_range(
        i64::from(ticks),
        i64::from(min_ticks),
        i64::from(max_ticks),
        0,
        i64::from(MAX_DEGREES),
    );
    u16::try_from(degrees.clamp(0, i64::from(MAX_DEGREES))).unwrap_or(0)
}

fn clamp_to_u32(value: i64, low: u32, high: u32) -> u32 {
    let clamped = value.clamp(i64::from(low), i64::from(high.max(low)));
    u32::try_from(clamped).unwrap_or(low)
}
