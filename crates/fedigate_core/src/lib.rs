/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod approval;
pub mod config;
pub mod delivery;
pub mod delivery_queue;
pub mod domain_perms;
pub mod error;
pub mod events;
pub mod gate;
pub mod http_retry;
pub mod ids;
pub mod interaction_requests;
pub mod model;
pub mod notifications;
pub mod policy;
pub mod poll_tally;
pub mod polls;
pub mod runtime;
pub mod social_db;

pub use error::{ErrorKind, GateError, GateResult};
