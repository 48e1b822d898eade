//! Two's-complement helpers for the fixed-width registers of the datapath.

/// Reinterprets the low `bits` bits of `value` as a signed number.
pub fn wrap_signed(value: i64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    (value << shift) >> shift
}

/// Keeps the low `bits` bits of an unsigned register.
pub fn mask_unsigned(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}
