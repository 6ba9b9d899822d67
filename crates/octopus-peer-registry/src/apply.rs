// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use kube::ResourceExt;
use octopus_k8s::{Peer, PeerRegistry, RegistryError};
use tracing::{debug, info, instrument, warn};

use crate::backoff::BackoffPolicy;
use crate::error::ApplyError;

/// What [`apply_self`] did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	Created,
	Updated,
	/// The stored record already matched; nothing was written.
	Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
	Create,
	Fetch,
}

/// Create-or-update this cluster's own Peer record.
///
/// Tries an unconditional create first. If the record exists it is fetched
/// and compared; only a record that differs in an owned field is rewritten,
/// on top of the fetched object so its metadata and unowned fields survive.
/// A version conflict on that write restarts from the fetch, paced by
/// `backoff`, until the policy runs out. A record that disappears midway
/// sends the loop back to create. Any other registry error is returned
/// unretried.
#[instrument(skip(registry, peer, backoff), fields(peer = %peer.name_any()))]
pub async fn apply_self<R, B>(
	registry: &R,
	namespace: &str,
	peer: &Peer,
	backoff: &mut B,
) -> Result<ApplyOutcome, ApplyError>
where
	R: PeerRegistry + ?Sized,
	B: BackoffPolicy + ?Sized,
{
	let name = peer.name_any();
	let mut step = Step::Create;
	let mut attempts = 0u32;
	backoff.reset();

	loop {
		let cause = match step {
			Step::Create => match registry.create(namespace, peer).await {
				Ok(_) => {
					info!("published peer record");
					return Ok(ApplyOutcome::Created);
				}
				Err(RegistryError::AlreadyExists { .. }) => {
					debug!("peer record exists, comparing");
					step = Step::Fetch;
					continue;
				}
				Err(e) => return Err(e.into()),
			},
			Step::Fetch => match update_existing(registry, namespace, &name, peer).await {
				Ok(outcome) => return Ok(outcome),
				Err(e) if e.is_conflict() => e,
				Err(e) if e.is_not_found() => {
					step = Step::Create;
					e
				}
				Err(e) => return Err(e.into()),
			},
		};

		attempts += 1;
		match backoff.next_delay() {
			Some(delay) => {
				warn!(
					attempt = attempts,
					delay_ms = delay.as_millis() as u64,
					error = %cause,
					"peer record changed concurrently, retrying"
				);
				tokio::time::sleep(delay).await;
			}
			None => {
				return Err(ApplyError::ConflictBudgetExhausted {
					name,
					attempts,
					last: cause,
				});
			}
		}
	}
}

/// One fetch-compare-update cycle against an existing record.
async fn update_existing<R>(
	registry: &R,
	namespace: &str,
	name: &str,
	desired: &Peer,
) -> Result<ApplyOutcome, RegistryError>
where
	R: PeerRegistry + ?Sized,
{
	let mut current = registry.get(namespace, name).await?;
	if !current.spec.needs_resync(&desired.spec) {
		debug!("peer record up to date");
		return Ok(ApplyOutcome::Unchanged);
	}

	current.spec.overwrite_owned_fields(&desired.spec);
	registry.replace(namespace, &current).await?;
	info!(
		version = ?current.metadata.resource_version,
		"updated peer record"
	);
	Ok(ApplyOutcome::Updated)
}
