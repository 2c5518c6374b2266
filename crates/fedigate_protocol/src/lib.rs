/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

pub const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Accept,
    Reject,
    Create,
}

/// Accept/Reject sent back to the actor whose reply, boost or like was gated.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DecisionActivity {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub actor: String,
    /// URI of the interaction being decided.
    pub object: String,
    /// URI of the status that was interacted with.
    pub target: String,
    pub to: Vec<String>,
    pub published: String,
}

/// A single poll answer, federated as `Create { Note { name } }`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoteActivity {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub actor: String,
    pub to: Vec<String>,
    pub object: VoteNote,
    pub published: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoteNote {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "attributedTo")]
    pub attributed_to: String,
    pub to: Vec<String>,
    pub name: String,
    #[serde(rename = "inReplyTo")]
    pub in_reply_to: String,
}
