/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::ids::now_ms;
use serde::Serialize;
use tokio::sync::broadcast;

/// Live event for in-process consumers (streaming API, admin UI).
/// Nothing depends on events being received.
#[derive(Clone, Debug, Serialize)]
pub struct GateEvent {
    pub kind: String,
    pub ts_ms: i64,
    pub detail: Option<String>,
    pub entity_id: Option<String>,
}

impl GateEvent {
    pub fn new(kind: &str, detail: Option<String>, entity_id: Option<String>) -> Self {
        Self {
            kind: kind.to_string(),
            ts_ms: now_ms(),
            detail,
            entity_id,
        }
    }
}

pub fn channel(capacity: usize) -> broadcast::Sender<GateEvent> {
    let (tx, _rx) = broadcast::channel(capacity.max(16));
    tx
}

/// Sends without caring whether anyone listens.
pub fn emit(events: &broadcast::Sender<GateEvent>, event: GateEvent) {
    let _ = events.send(event);
}
