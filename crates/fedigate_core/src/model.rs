/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::policy::InteractionPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Reply,
    Reblog,
    Favourite,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [Self::Reply, Self::Reblog, Self::Favourite];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Reblog => "reblog",
            Self::Favourite => "favourite",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "reply" => Some(Self::Reply),
            "reblog" | "boost" | "announce" => Some(Self::Reblog),
            "favourite" | "favorite" | "like" => Some(Self::Favourite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Unlisted,
    FollowersOnly,
    Direct,
    /// Visible to the author only.
    OnlyMe,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::FollowersOnly => "followers_only",
            Self::Direct => "direct",
            Self::OnlyMe => "only_me",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Self::Public),
            "unlisted" => Some(Self::Unlisted),
            "followers_only" | "followers" | "private" => Some(Self::FollowersOnly),
            "direct" => Some(Self::Direct),
            "only_me" | "me" => Some(Self::OnlyMe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub username: String,
    /// `None` for local accounts.
    pub domain: Option<String>,
    pub uri: String,
    pub inbox_url: Option<String>,
    pub admin: bool,
    pub created_at_ms: i64,
}

impl Account {
    pub fn is_local(&self) -> bool {
        self.domain.is_none()
    }

    pub fn acct(&self) -> String {
        match &self.domain {
            Some(d) => format!("{}@{}", self.username, d),
            None => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_account_id: Option<String>,
    pub boost_of_id: Option<String>,
    /// Account IDs mentioned by this status.
    pub mentions: Vec<String>,
    pub visibility: Visibility,
    pub pending_approval: bool,
    pub approved_by_uri: Option<String>,
    pub rejected_by_uri: Option<String>,
    /// `None` means "derive from visibility"; see [`crate::policy::resolve_policy`].
    pub interaction_policy: Option<InteractionPolicy>,
    pub created_at_ms: i64,
}

impl Status {
    pub fn mentions_account(&self, account_id: &str) -> bool {
        self.mentions.iter().any(|m| m == account_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favourite {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub status_id: String,
    pub pending_approval: bool,
    pub approved_by_uri: Option<String>,
    pub rejected_by_uri: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending = 0,
    Accepted = 1,
    Rejected = 2,
}

impl RequestState {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::Accepted),
            2 => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRequest {
    pub id: String,
    pub interaction_uri: String,
    pub kind: InteractionKind,
    pub status_id: String,
    pub account_id: String,
    pub created_at_ms: i64,
    pub state: RequestState,
    pub decided_at_ms: Option<i64>,
    pub decision_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub id: String,
    pub status_id: String,
    pub options: Vec<String>,
    pub multiple: bool,
    /// `None` for polls that never close.
    pub expires_at_ms: Option<i64>,
    pub created_at_ms: i64,
}

impl Poll {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map(|t| t <= now_ms).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollVote {
    pub id: String,
    pub poll_id: String,
    pub account_id: String,
    pub choices: Vec<usize>,
    pub created_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_stored_names_and_aliases() {
        for kind in InteractionKind::ALL {
            assert_eq!(InteractionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(InteractionKind::parse(" Like "), Some(InteractionKind::Favourite));
        assert_eq!(InteractionKind::parse("announce"), Some(InteractionKind::Reblog));
        assert_eq!(InteractionKind::parse("quote"), None);

        assert_eq!(Visibility::parse("followers_only"), Some(Visibility::FollowersOnly));
        assert_eq!(Visibility::parse("private"), Some(Visibility::FollowersOnly));
        assert_eq!(Visibility::parse("ME"), Some(Visibility::OnlyMe));
        assert_eq!(Visibility::parse("circle"), None);
    }
}
