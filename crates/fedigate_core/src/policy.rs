/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::model::{Account, InteractionKind, Status, Visibility};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    /// Anyone may try; mentioned accounts and followers of the author are let
    /// through, everyone else waits for approval.
    Everyone,
    /// Mentioned accounts are let through, followers need approval.
    Followers,
    /// Only mentioned accounts.
    Mentioned,
    /// Only the author.
    Me,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub scope: PolicyScope,
    /// Account IDs always let through.
    #[serde(default)]
    pub automatic_approval: BTreeSet<String>,
    /// Account IDs that may interact once the author approves.
    #[serde(default)]
    pub manual_approval: BTreeSet<String>,
}

impl PolicyRule {
    pub fn scoped(scope: PolicyScope) -> Self {
        Self {
            scope,
            automatic_approval: BTreeSet::new(),
            manual_approval: BTreeSet::new(),
        }
    }
}

/// Per-status policy. Any rule left unset falls back to the visibility default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionPolicy {
    #[serde(default)]
    pub can_reply: Option<PolicyRule>,
    #[serde(default)]
    pub can_reblog: Option<PolicyRule>,
    #[serde(default)]
    pub can_favourite: Option<PolicyRule>,
}

impl InteractionPolicy {
    pub fn rule(&self, kind: InteractionKind) -> Option<&PolicyRule> {
        match kind {
            InteractionKind::Reply => self.can_reply.as_ref(),
            InteractionKind::Reblog => self.can_reblog.as_ref(),
            InteractionKind::Favourite => self.can_favourite.as_ref(),
        }
    }

    pub fn set_rule(&mut self, kind: InteractionKind, rule: PolicyRule) {
        let slot = match kind {
            InteractionKind::Reply => &mut self.can_reply,
            InteractionKind::Reblog => &mut self.can_reblog,
            InteractionKind::Favourite => &mut self.can_favourite,
        };
        *slot = Some(rule);
    }

    /// Fully populated policy for the given visibility.
    pub fn default_for(visibility: Visibility) -> Self {
        let mut out = Self::default();
        for kind in InteractionKind::ALL {
            out.set_rule(kind, default_rule(visibility, kind));
        }
        out
    }
}

pub fn default_rule(visibility: Visibility, kind: InteractionKind) -> PolicyRule {
    let scope = match (visibility, kind) {
        (Visibility::Public | Visibility::Unlisted, _) => PolicyScope::Everyone,
        // Boosting a non-public post would widen its audience.
        (Visibility::FollowersOnly | Visibility::Direct, InteractionKind::Reblog) => PolicyScope::Me,
        (Visibility::FollowersOnly, _) => PolicyScope::Followers,
        (Visibility::Direct, _) => PolicyScope::Mentioned,
        (Visibility::OnlyMe, _) => PolicyScope::Me,
    };
    PolicyRule::scoped(scope)
}

/// Effective rule for `kind` on `status`: the explicit one, else the default.
pub fn resolve_policy(status: &Status, kind: InteractionKind) -> Cow<'_, PolicyRule> {
    match status.interaction_policy.as_ref().and_then(|p| p.rule(kind)) {
        Some(rule) => Cow::Borrowed(rule),
        None => Cow::Owned(default_rule(status.visibility, kind)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainPermission {
    Allowed,
    Silenced,
    Blocked,
}

pub trait DomainPermissions: Send + Sync {
    fn check(&self, domain: &str) -> Result<DomainPermission>;
}

pub trait Relationships: Send + Sync {
    fn follows(&self, follower_id: &str, target_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    RequireApproval,
    Forbid,
}

#[derive(Clone)]
pub struct PolicyEvaluator {
    domains: Arc<dyn DomainPermissions>,
    relationships: Arc<dyn Relationships>,
}

impl PolicyEvaluator {
    pub fn new(domains: Arc<dyn DomainPermissions>, relationships: Arc<dyn Relationships>) -> Self {
        Self {
            domains,
            relationships,
        }
    }

    /// Decides whether `requester` may perform `kind` on `status`. Performs no writes.
    ///
    /// Accounts from a blocked domain are always forbidden. A silenced domain
    /// never gets through on scope alone and has to be approved, unless the
    /// account is listed for automatic approval.
    pub fn evaluate(
        &self,
        status: &Status,
        requester: &Account,
        kind: InteractionKind,
    ) -> Result<PolicyDecision> {
        let rule = resolve_policy(status, kind);

        let mut silenced = false;
        if let Some(domain) = requester.domain.as_deref() {
            let perm = self
                .domains
                .check(domain)
                .with_context(|| format!("domain permission check: {domain}"))?;
            match perm {
                DomainPermission::Blocked => return Ok(PolicyDecision::Forbid),
                DomainPermission::Silenced => silenced = true,
                DomainPermission::Allowed => {}
            }
        }

        if requester.id == status.account_id {
            return Ok(PolicyDecision::Allow);
        }
        if rule.automatic_approval.contains(&requester.id) {
            return Ok(PolicyDecision::Allow);
        }

        let mentioned = status.mentions_account(&requester.id);
        let follows = || {
            self.relationships
                .follows(&requester.id, &status.account_id)
                .with_context(|| {
                    format!("follow lookup {} -> {}", requester.id, status.account_id)
                })
        };

        let by_scope = match rule.scope {
            PolicyScope::Everyone => {
                if mentioned || follows()? {
                    PolicyDecision::Allow
                } else {
                    PolicyDecision::RequireApproval
                }
            }
            PolicyScope::Followers => {
                if mentioned {
                    PolicyDecision::Allow
                } else if follows()? {
                    PolicyDecision::RequireApproval
                } else {
                    PolicyDecision::Forbid
                }
            }
            PolicyScope::Mentioned => {
                if mentioned {
                    PolicyDecision::Allow
                } else {
                    PolicyDecision::Forbid
                }
            }
            PolicyScope::Me => PolicyDecision::Forbid,
        };

        Ok(match by_scope {
            PolicyDecision::Allow if silenced => PolicyDecision::RequireApproval,
            PolicyDecision::Allow => PolicyDecision::Allow,
            _ if rule.manual_approval.contains(&requester.id) => PolicyDecision::RequireApproval,
            other => other,
        })
    }
}
