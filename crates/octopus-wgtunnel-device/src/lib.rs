// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The local WireGuard device.
//!
//! [`DeviceController`] is the single owner of one network link and the
//! WireGuard device bound to it. It walks the device through
//! `Unconfigured -> LinkCreated -> KeysConfigured -> Up`, performs exactly one
//! full peer replace during bring-up, and afterwards only ever applies
//! incremental [`PeerDelta`]s.
//!
//! The kernel is reached through the [`WgBackend`] trait so the state machine
//! can be exercised without `CAP_NET_ADMIN`:
//!
//! - [`KernelBackend`] (Linux only) talks rtnetlink for the link and the
//!   WireGuard generic netlink family for keys and peers.
//! - [`MemoryBackend`] keeps everything in memory and records every call.

mod backend;
mod controller;
mod error;
#[cfg(target_os = "linux")]
mod kernel;
mod memory;

pub use backend::{DeviceConfig, LinkHandle, WgBackend};
pub use controller::{DeviceController, DeviceState};
pub use error::{DeviceError, LinkCreateKind, Result};
#[cfg(target_os = "linux")]
pub use kernel::KernelBackend;
pub use memory::{MemoryBackend, MemoryFailure};
pub use octopus_wgtunnel_common::{PeerConfig, PeerDelta};
