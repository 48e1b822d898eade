//! Raw register values in engineering units.

/// Magnitude as a fraction of converter full scale.
pub fn mag_full_scale(raw: u64, cordic_width: u32) -> f64 {
    raw as f64 / (1u64 << cordic_width) as f64
}

/// Magnitude in dB relative to full scale; zero maps to negative infinity.
pub fn mag_dbfs(raw: u64, cordic_width: u32) -> f64 {
    20.0 * mag_full_scale(raw, cordic_width).log10()
}

/// Phase register in degrees; the register spans [-180, 180).
pub fn phase_degrees(raw: i64, cordic_width: u32) -> f64 {
    raw as f64 / (1u64 << cordic_width) as f64 * 180.0
}
