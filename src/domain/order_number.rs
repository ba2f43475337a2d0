//! Human-readable order numbers: `TP-<millis base36>-<4 random base36>`.

use chrono::{DateTime, Utc};
use rand::Rng;

pub const PREFIX: &str = "TP";
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_LEN: usize = 4;

/// Upper-case base36 rendering of `value`.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 { return "0".to_string(); }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Builds an order number for `now` drawing the suffix from `rng`.
pub fn render<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let suffix: String = (0..RANDOM_LEN).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect();
    format!("{PREFIX}-{}-{suffix}", to_base36(millis))
}

/// Order number for the current instant.
pub fn generate() -> String { render(Utc::now(), &mut rand::thread_rng()) }

/// Checks the `TP-[0-9A-Z]+-[0-9A-Z]{4}` shape.
pub fn is_well_formed(candidate: &str) -> bool {
    let base36 = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());
    let mut parts = candidate.split('-');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some(PREFIX), Some(ts), Some(rnd), None) if base36(ts) && base36(rnd) && rnd.len() == RANDOM_LEN
    )
}
