#![forbid(unsafe_code)]

use std::time::Duration;

use rand::Rng;

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 30_000;

/// Exponential backoff with ±10% jitter for reconnect attempt `attempt`
/// (1-based). Capped at 30 seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
	let pow = 2u64.saturating_pow(attempt.saturating_sub(1).min(6));
	let delay_ms = BACKOFF_BASE_MS.saturating_mul(pow).min(BACKOFF_MAX_MS);
	let jitter_window = (delay_ms / 10).max(1);
	let mut rng = rand::rng();
	let jitter_offset = rng.random_range(0..=(jitter_window * 2));
	Duration::from_millis(delay_ms.saturating_sub(jitter_window).saturating_add(jitter_offset))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn delay_grows_and_stays_bounded() {
		for attempt in 1..=12u32 {
			let d = backoff_delay(attempt).as_millis() as u64;
			assert!(d >= BACKOFF_BASE_MS.saturating_sub(BACKOFF_BASE_MS / 10), "attempt {attempt}: {d}ms");
			assert!(d <= BACKOFF_MAX_MS + BACKOFF_MAX_MS / 10, "attempt {attempt}: {d}ms");
		}
	}

	#[test]
	fn first_attempt_is_near_the_base() {
		let d = backoff_delay(1).as_millis() as u64;
		assert!((450..=600).contains(&d), "{d}ms");
	}
}
