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

//! Process shell around the `election` crate.
//!
//! Parses flags, builds the cluster client (or an in-memory store in dry-run
//! mode), serves health endpoints and runs the demo workload either directly or
//! under leader election.

pub mod app;
pub mod cli;
pub mod client;
pub mod server;
pub mod version;

pub use cli::{Cli, Commands, LeaderElectionArgs, LogFormat};
pub use server::Readiness;
pub use version::BuildInfo;
