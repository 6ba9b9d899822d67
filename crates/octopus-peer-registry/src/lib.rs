// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Publishing and retracting this cluster's own Peer record.
//!
//! Several replicas of the same agent may race on one record, and the hub
//! may be briefly unreachable. [`apply_self`] resolves version conflicts with
//! a bounded retry; [`retract_self`] treats an already-deleted record as done
//! and retries everything else until its deadline.

mod apply;
mod backoff;
mod error;
mod retract;

pub use apply::{apply_self, ApplyOutcome};
pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use error::{ApplyError, RetractError};
pub use retract::{retract_self, RetractOutcome};
