// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use octopus_k8s::PeerRegistry;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backoff::BackoffPolicy;
use crate::error::RetractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractOutcome {
	Deleted,
	/// Someone else already removed the record.
	AlreadyAbsent,
}

/// Delete this cluster's own Peer record.
///
/// A missing record counts as success. Any other failure is retried with
/// `backoff` until it succeeds, `timeout` elapses, the policy runs out, or
/// `cancel` fires. An in-flight delete is abandoned at the deadline.
#[instrument(skip(registry, backoff, cancel))]
pub async fn retract_self<R, B>(
	registry: &R,
	namespace: &str,
	name: &str,
	backoff: &mut B,
	timeout: Duration,
	cancel: &CancellationToken,
) -> Result<RetractOutcome, RetractError>
where
	R: PeerRegistry + ?Sized,
	B: BackoffPolicy + ?Sized,
{
	let deadline = Instant::now() + timeout;
	let mut last = None;
	let mut attempts = 0u32;
	backoff.reset();

	loop {
		let result = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				return Err(RetractError::Cancelled { name: name.to_string(), last });
			}
			_ = tokio::time::sleep_until(deadline) => {
				return Err(RetractError::DeadlineExceeded { name: name.to_string(), timeout, last });
			}
			result = registry.delete(namespace, name) => result,
		};
		attempts += 1;

		let err = match result {
			Ok(()) => {
				info!("retracted peer record");
				return Ok(RetractOutcome::Deleted);
			}
			Err(e) if e.is_not_found() => {
				info!("peer record already absent");
				return Ok(RetractOutcome::AlreadyAbsent);
			}
			Err(e) => e,
		};

		let Some(delay) = backoff.next_delay() else {
			return Err(RetractError::RetriesExhausted {
				name: name.to_string(),
				attempts,
				last: err,
			});
		};
		warn!(
			attempt = attempts,
			delay_ms = delay.as_millis() as u64,
			error = %err,
			"failed to delete peer record, retrying"
		);
		last = Some(err);

		tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				return Err(RetractError::Cancelled { name: name.to_string(), last });
			}
			_ = tokio::time::sleep_until(deadline) => {
				return Err(RetractError::DeadlineExceeded { name: name.to_string(), timeout, last });
			}
			_ = tokio::time::sleep(delay) => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backoff::ExponentialBackoff;
	use octopus_k8s::{MockOp, MockPeerRegistry, Peer, PeerSpec, RegistryError};

	const NS: &str = "syncer-operator";

	fn unbounded() -> ExponentialBackoff {
		ExponentialBackoff::new(Duration::from_millis(1), 2.0, Duration::from_millis(10))
			.with_max_retries(None)
	}

	fn unavailable() -> RegistryError {
		RegistryError::Unavailable {
			message: "connection refused".to_string(),
		}
	}

	fn seeded() -> MockPeerRegistry {
		let registry = MockPeerRegistry::new();
		registry.insert(
			NS,
			Peer::for_cluster(
				NS,
				PeerSpec {
					cluster_id: "alpha".to_string(),
					..Default::default()
				},
			),
		);
		registry
	}

	#[tokio::test]
	async fn deletes_existing_record() {
		let registry = seeded();

		let outcome = retract_self(
			&registry,
			NS,
			"alpha",
			&mut unbounded(),
			Duration::from_secs(5),
			&CancellationToken::new(),
		)
		.await
		.unwrap();

		assert_eq!(outcome, RetractOutcome::Deleted);
		assert!(registry.stored(NS, "alpha").is_none());
	}

	/// Purpose: a record removed by someone else must not turn cleanup into
	/// an error.
	#[tokio::test]
	async fn missing_record_is_success() {
		let registry = MockPeerRegistry::new();

		let outcome = retract_self(
			&registry,
			NS,
			"alpha",
			&mut unbounded(),
			Duration::from_secs(5),
			&CancellationToken::new(),
		)
		.await
		.unwrap();

		assert_eq!(outcome, RetractOutcome::AlreadyAbsent);
		assert_eq!(registry.calls(MockOp::Delete), 1);
	}

	#[tokio::test]
	async fn retries_transient_failures() {
		let registry = seeded();
		registry.fail_next(MockOp::Delete, unavailable());
		registry.fail_next(MockOp::Delete, unavailable());

		let outcome = retract_self(
			&registry,
			NS,
			"alpha",
			&mut unbounded(),
			Duration::from_secs(5),
			&CancellationToken::new(),
		)
		.await
		.unwrap();

		assert_eq!(outcome, RetractOutcome::Deleted);
		assert_eq!(registry.calls(MockOp::Delete), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_surfaces_last_error() {
		let registry = seeded();
		for _ in 0..10_000 {
			registry.fail_next(MockOp::Delete, unavailable());
		}

		let err = retract_self(
			&registry,
			NS,
			"alpha",
			&mut unbounded(),
			Duration::from_millis(200),
			&CancellationToken::new(),
		)
		.await
		.unwrap_err();

		assert!(matches!(err, RetractError::DeadlineExceeded { .. }));
		assert!(matches!(
			err.last_error(),
			Some(RegistryError::Unavailable { .. })
		));
		assert!(registry.stored(NS, "alpha").is_some());
	}

	#[tokio::test]
	async fn bounded_policy_gives_up() {
		let registry = seeded();
		for _ in 0..3 {
			registry.fail_next(MockOp::Delete, unavailable());
		}
		let mut backoff = unbounded().with_max_retries(Some(2));

		let err = retract_self(
			&registry,
			NS,
			"alpha",
			&mut backoff,
			Duration::from_secs(5),
			&CancellationToken::new(),
		)
		.await
		.unwrap_err();

		assert!(matches!(
			err,
			RetractError::RetriesExhausted { attempts: 3, .. }
		));
	}

	#[tokio::test]
	async fn cancelled_token_stops_retrying() {
		let registry = seeded();
		let cancel = CancellationToken::new();
		cancel.cancel();

		let err = retract_self(
			&registry,
			NS,
			"alpha",
			&mut unbounded(),
			Duration::from_secs(5),
			&cancel,
		)
		.await
		.unwrap_err();

		assert!(matches!(err, RetractError::Cancelled { last: None, .. }));
		assert_eq!(registry.calls(MockOp::Delete), 0);
	}
}
