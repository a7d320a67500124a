//! Usage estimation from raw content

/// Approximate usage units for `text` at a fixed `chars_per_unit` ratio.
///
/// Any non-empty text costs at least one unit.
pub fn estimate_units(text: &str, chars_per_unit: f64) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count();
    if !chars_per_unit.is_finite() || chars_per_unit <= 0.0 {
        return chars as u64;
    }

    ((chars as f64 / chars_per_unit).ceil() as u64).max(1)
}
