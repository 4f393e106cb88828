/*
 * kle - Kubernetes leader election
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Single-active-leader coordination over a lease lock.
//!
//! Exactly one process at a time runs the protected workload. The lease lives
//! in a shared store (a Kubernetes Lease, or [`MemoryStore`] for dry runs) and
//! every write to it is a compare-and-swap on the record version.
//!
//! ## Architecture
//!
//! - **[`lock`]**: the versioned lock record and its backends
//! - **[`LeaderElector`]**: acquire, renew, self-demote, release
//! - **[`run_election`]**: config validation, identity, and per-term workload supervision
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = kube::Client::try_default().await?;
//! let config = ElectionConfig::default().with_resource("demo", "kle");
//! let cancel = CancellationToken::new();
//!
//! run_election(
//!     |term| async move {
//!         term.cancelled().await;
//!     },
//!     &client,
//!     &config,
//!     cancel,
//! )
//! .await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod lock;
pub mod runner;

pub use config::ElectionConfig;
pub use engine::{ElectionPhase, ElectionState, LeaderElector, LeaderEvent};
pub use error::{ElectionError, LockError, Result};
pub use identity::Identity;
pub use lock::{LockBackend, LockKind, LockRecord, MemoryStore, ResourceLock, VersionToken};
pub use runner::run_election;
