use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

#[inline]
#[must_use]
#[allow(clippy::as_conversions)]
pub fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("positive duration after epoch")
		.as_millis() as u64
}

/// Delay before the next attempt of a retried operation. Doubles per try
/// from `base` up to `max` with jitter to avoid retry alignment between
/// rooms.
#[must_use]
pub fn backoff_delay(tries: u32, base: Duration, max: Duration) -> Duration {
	let pow = 2_u32.saturating_pow(tries.min(16));
	let delay = base.saturating_mul(pow).min(max);
	let jitter = rand::thread_rng().gen_range(0..=delay.as_millis().max(1));

	#[allow(clippy::as_conversions)]
	delay.saturating_add(Duration::from_millis(jitter as u64 / 2))
}
