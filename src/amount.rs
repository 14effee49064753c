use alloy::primitives::U256;

/// Convert a raw token amount to its exact decimal representation.
///
/// Works on the base-10 digits of the value directly, so the full 256-bit
/// range survives with no rounding. Whole values render without a decimal
/// point and trailing fractional zeros are trimmed (`5000000` at 6 decimals
/// is `"5"`, `5000001` is `"5.000001"`).
pub fn normalize(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    // Pad so there is always at least one integer digit to split off.
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);

    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}
