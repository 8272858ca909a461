//! Instrument topology: strike increments and ATM windows
//!
//! Pure, total functions. The increment table is static; unknown
//! indices fall back to a default increment rather than failing, so a
//! misconfigured index degrades to coarse strikes instead of halting
//! expansion.

/// Increment applied when no table entry matches.
pub const DEFAULT_STRIKE_INCREMENT: i64 = 100;

/// Strike increment for an index, keyed case-insensitively.
pub fn strike_increment(index_name: &str) -> i64 {
    match index_name.to_ascii_lowercase().as_str() {
        "nifty" => 50,
        "banknifty" => 100,
        "finnifty" => 50,
        "midcpnifty" => 25,
        "bankex" => 100,
        "sensex" => 100,
        _ => DEFAULT_STRIKE_INCREMENT,
    }
}

/// At-the-money strike: `price` rounded to the nearest increment
/// multiple, half away from zero.
pub fn atm_strike(index_name: &str, price: f64) -> i64 {
    let increment = strike_increment(index_name);
    round_to_increment(price, increment)
}

/// Round a price to the nearest multiple of `increment`, half away
/// from zero. `f64::round` rounds half away from zero already.
pub fn round_to_increment(price: f64, increment: i64) -> i64 {
    (price / increment as f64).round() as i64 * increment
}

/// Symmetric window of `2 * radius + 1` strikes around `center`, in
/// ascending order.
pub fn strike_window(center: i64, increment: i64, radius: u32) -> Vec<i64> {
    let radius = radius as i64;
    (-radius..=radius).map(|i| center + i * increment).collect()
}
