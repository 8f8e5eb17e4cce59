//! Fixed-point arithmetic shared by every valuation in the engine.
//!
//! USD values and oracle prices are 18-decimal integers (`WAD == $1`).
//! Asset amounts stay in their native base units and are converted here,
//! and only here, with 256-bit intermediates.

uint::construct_uint! {
    pub struct U256(4);
}

pub const USD_DECIMALS: u8 = 18;
pub const CORE_DECIMALS: u8 = 18;
pub const BTC_DECIMALS: u8 = 8;
pub const SHARE_DECIMALS: u8 = 18;

/// 1.0 in 18-decimal fixed point.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator (100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

pub const fn pow10(decimals: u8) -> u128 {
    10u128.pow(decimals as u32)
}

/// Whole-token amount in base units, e.g. `units(100, CORE_DECIMALS)`.
pub const fn units(whole: u128, decimals: u8) -> u128 {
    whole * pow10(decimals)
}

/// `a * b / denominator`, rounded down. `None` on a zero denominator or
/// when the result does not fit in 128 bits.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let result = U256::from(a) * U256::from(b) / U256::from(denominator);
    if result > U256::from(u128::MAX) {
        return None;
    }
    Some(result.as_u128())
}

/// `amount * bps / 10_000`, rounded down.
pub fn bps_of(amount: u128, bps: u128) -> Option<u128> {
    mul_div(amount, bps, BPS_DENOMINATOR)
}

/// USD value (wad) of `amount` base units priced at `price` (wad per whole token).
pub fn to_usd(amount: u128, decimals: u8, price: u128) -> Option<u128> {
    mul_div(amount, price, pow10(decimals))
}

/// Display helper: wad value as a decimal string with `precision` digits.
pub fn format_wad(value: u128, precision: usize) -> String {
    format_units(value, USD_DECIMALS, precision)
}

pub fn format_units(value: u128, decimals: u8, precision: usize) -> String {
    let scale = pow10(decimals);
    let whole = value / scale;
    let frac = value % scale;
    if precision == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = decimals as usize);
    let shown = &digits[..precision.min(digits.len())];
    format!("{}.{}", whole, shown)
}
