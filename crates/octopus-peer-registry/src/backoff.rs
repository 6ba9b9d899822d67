// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backoff policies for registry retries.

use std::time::Duration;

/// Yields the wait before each retry, or `None` once the budget is spent.
pub trait BackoffPolicy: Send {
	fn next_delay(&mut self) -> Option<Duration>;

	/// Start over from the first delay.
	fn reset(&mut self);
}

/// Exponential backoff with optional jitter and an optional retry budget.
///
/// The defaults (10ms, factor 5, jitter 0.1, 4 retries) match the backoff
/// Kubernetes clients use for conflict retries.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
	pub base_delay: Duration,
	pub factor: f64,
	/// Up to this fraction of the delay is added at random.
	pub jitter: f64,
	pub max_delay: Duration,
	/// `None` retries until the caller gives up.
	pub max_retries: Option<u32>,
	retries: u32,
}

impl Default for ExponentialBackoff {
	fn default() -> Self {
		Self {
			base_delay: Duration::from_millis(10),
			factor: 5.0,
			jitter: 0.1,
			max_delay: Duration::from_secs(5),
			max_retries: Some(4),
			retries: 0,
		}
	}
}

impl ExponentialBackoff {
	pub fn new(base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
		Self {
			base_delay,
			factor,
			max_delay,
			..Default::default()
		}
	}

	pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
		self.max_retries = max_retries;
		self
	}

	pub fn without_jitter(mut self) -> Self {
		self.jitter = 0.0;
		self
	}

	pub fn retries(&self) -> u32 {
		self.retries
	}
}

impl BackoffPolicy for ExponentialBackoff {
	fn next_delay(&mut self) -> Option<Duration> {
		if self.max_retries.is_some_and(|max| self.retries >= max) {
			return None;
		}

		let exponential = self.base_delay.as_secs_f64() * self.factor.powi(self.retries as i32);
		let jittered = if self.jitter > 0.0 {
			exponential * (1.0 + self.jitter * fastrand::f64())
		} else {
			exponential
		};
		self.retries += 1;

		Some(Duration::from_secs_f64(
			jittered.min(self.max_delay.as_secs_f64()),
		))
	}

	fn reset(&mut self) {
		self.retries = 0;
	}
}
