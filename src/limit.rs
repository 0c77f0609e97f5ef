//! Process-wide cap on emitted records

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared by every decoder in the process; when the cap is reached, workers
/// observe it and unwind cleanly
pub struct Limiter {
	max: u64,
	emitted: AtomicU64,
}

impl Limiter {
	/// `None` means unlimited
	pub fn new(max: Option<u64>) -> Self {
		Self {
			max: max.unwrap_or(u64::MAX),
			emitted: AtomicU64::new(0),
		}
	}

	/// Whether the cap has been reached
	pub fn finished(&self) -> bool {
		self.emitted.load(Ordering::Relaxed) >= self.max
	}

	/// Claim one emission slot
	///
	/// Exactly `max` calls across all threads return `true`; a `false`
	/// return means the record must not be emitted.
	pub fn admit(&self) -> bool {
		self.emitted.fetch_add(1, Ordering::Relaxed) < self.max
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn admits_exactly_max() {
		let limiter = Limiter::new(Some(3));
		assert!(!limiter.finished());
		assert!(limiter.admit());
		assert!(limiter.admit());
		assert!(limiter.admit());
		assert!(limiter.finished());
		assert!(!limiter.admit());
	}

	#[test]
	fn admits_exactly_max_across_threads() {
		let limiter = Limiter::new(Some(100));
		let admitted = AtomicU64::new(0);
		std::thread::scope(|scope| {
			for _ in 0..4 {
				scope.spawn(|| {
					for _ in 0..100 {
						if limiter.admit() {
							admitted.fetch_add(1, Ordering::Relaxed);
						}
					}
				});
			}
		});
		assert_eq!(admitted.load(Ordering::Relaxed), 100);
	}

	#[test]
	fn unlimited_never_finishes() {
		let limiter = Limiter::new(None);
		for _ in 0..1000 {
			assert!(limiter.admit());
		}
		assert!(!limiter.finished());
	}
}
