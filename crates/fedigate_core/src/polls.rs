/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::delivery_queue::DeliveryQueue;
use crate::error::{ErrorKind, GateError, GateResult};
use crate::ids::{now_ms, rfc3339_ms};
use crate::model::{Account, Poll, PollVote, Status, Visibility};
use crate::policy::{DomainPermission, DomainPermissions, Relationships};
use crate::poll_tally::PollTally;
use crate::social_db::SocialDb;
use anyhow::{Context, Result};
use fedigate_protocol::{ActivityType, VoteActivity, VoteNote, AS_CONTEXT};
use std::sync::Arc;
use tracing::{info, warn};

/// A poll as seen by one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollView {
    pub poll: Poll,
    pub counts: Vec<u64>,
    pub voters_count: u64,
    pub expired: bool,
    /// The requester's own choices, if they voted.
    pub own_choices: Option<Vec<usize>>,
}

/// Poll reads and votes on behalf of an account, gated on whether the
/// account can see the status the poll belongs to.
#[derive(Clone)]
pub struct PollProcessor {
    db: SocialDb,
    tally: PollTally,
    domains: Arc<dyn DomainPermissions>,
    queue: DeliveryQueue,
}

impl PollProcessor {
    pub fn new(
        db: SocialDb,
        tally: PollTally,
        domains: Arc<dyn DomainPermissions>,
        queue: DeliveryQueue,
    ) -> Self {
        Self {
            db,
            tally,
            domains,
            queue,
        }
    }

    pub async fn get_poll(&self, requester_id: &str, poll_id: &str) -> GateResult<PollView> {
        let this = self.clone();
        let requester_id = requester_id.to_string();
        let poll_id = poll_id.to_string();
        tokio::task::spawn_blocking(move || -> GateResult<PollView> {
            let target = this.visible_target(&requester_id, &poll_id)?;
            this.view(target.poll, &requester_id)
        })
        .await?
    }

    pub async fn vote(
        &self,
        requester_id: &str,
        poll_id: &str,
        choices: &[usize],
    ) -> GateResult<PollView> {
        let this = self.clone();
        let requester_id = requester_id.to_string();
        let poll_id = poll_id.to_string();
        let choices = choices.to_vec();
        let (view, vote, target) = tokio::task::spawn_blocking(move || -> GateResult<(PollView, PollVote, PollTarget)> {
            let target = this.visible_target(&requester_id, &poll_id)?;
            if target.owner.id == requester_id {
                return Err(GateError::invalid(format!(
                    "account {requester_id} cannot vote in own poll {poll_id}"
                )));
            }
            let vote = this.tally.register_vote(&poll_id, &requester_id, &choices)?;
            let view = this.view(target.poll.clone(), &requester_id)?;
            Ok((view, vote, target))
        })
        .await??;

        info!(
            "vote {} by {} on poll {} choices={:?}",
            vote.id, vote.account_id, vote.poll_id, vote.choices
        );
        // The vote is committed; delivery trouble is retried by the queue or logged.
        if let Err(e) = self.federate_vote(&vote, &target).await {
            warn!("queue vote {} for delivery: {e:#}", vote.id);
        }
        Ok(view)
    }

    fn visible_target(&self, requester_id: &str, poll_id: &str) -> GateResult<PollTarget> {
        let poll = self.tally.get_poll(poll_id)?;
        let status = self
            .db
            .get_status(&poll.status_id)?
            .ok_or_else(|| GateError::not_found(format!("status {}", poll.status_id)))?;
        let requester = self
            .db
            .get_account(requester_id)?
            .ok_or_else(|| GateError::not_found(format!("account {requester_id}")))?;
        let owner = self
            .db
            .get_account(&status.account_id)?
            .ok_or_else(|| GateError::not_found(format!("account {}", status.account_id)))?;

        if !status_visible_to(&status, &requester, self.domains.as_ref(), &self.db)? {
            // Invisible polls look exactly like missing ones.
            return Err(GateError::not_found(format!("poll {poll_id}")));
        }
        Ok(PollTarget {
            poll,
            status,
            requester,
            owner,
        })
    }

    fn view(&self, poll: Poll, requester_id: &str) -> GateResult<PollView> {
        let counts = self.tally.count_votes(&poll.id)?;
        let own_choices = match self.tally.get_vote_by(&poll.id, requester_id) {
            Ok(v) => Some(v.choices),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        Ok(PollView {
            expired: poll.is_expired_at(now_ms()),
            poll,
            counts: counts.options,
            voters_count: counts.voters,
            own_choices,
        })
    }

    /// Local votes on remote polls go to the poll owner, one activity per choice.
    async fn federate_vote(&self, vote: &PollVote, target: &PollTarget) -> Result<()> {
        if !target.requester.is_local() {
            return Ok(());
        }
        let Some(inbox) = target.owner.inbox_url.clone() else {
            return Ok(());
        };
        for idx in &vote.choices {
            let name = target
                .poll
                .options
                .get(*idx)
                .cloned()
                .with_context(|| format!("option {idx} missing on poll {}", target.poll.id))?;
            let id = format!("{}#votes/{}/{}", target.requester.uri, vote.id, idx);
            let activity = VoteActivity {
                context: AS_CONTEXT.to_string(),
                id: format!("{id}/activity"),
                kind: ActivityType::Create,
                actor: target.requester.uri.clone(),
                to: vec![target.owner.uri.clone()],
                object: VoteNote {
                    id,
                    kind: "Note".to_string(),
                    attributed_to: target.requester.uri.clone(),
                    to: vec![target.owner.uri.clone()],
                    name,
                    in_reply_to: target.status.uri.clone(),
                },
                published: rfc3339_ms(vote.created_at_ms),
            };
            let body = serde_json::to_vec(&activity).context("encode vote activity")?;
            self.queue
                .enqueue_activity(body, vec![inbox.clone()])
                .await?;
        }
        Ok(())
    }
}

struct PollTarget {
    poll: Poll,
    status: Status,
    requester: Account,
    owner: Account,
}

/// Whether `viewer` may see `status`. Blocked domains see nothing but their own posts.
pub fn status_visible_to(
    status: &Status,
    viewer: &Account,
    domains: &dyn DomainPermissions,
    relationships: &dyn Relationships,
) -> Result<bool> {
    if viewer.id == status.account_id {
        return Ok(true);
    }
    if let Some(domain) = viewer.domain.as_deref() {
        if domains.check(domain)? == DomainPermission::Blocked {
            return Ok(false);
        }
    }
    let mentioned = status.mentions_account(&viewer.id);
    Ok(match status.visibility {
        Visibility::Public | Visibility::Unlisted => true,
        Visibility::FollowersOnly => {
            mentioned || relationships.follows(&viewer.id, &status.account_id)?
        }
        Visibility::Direct => mentioned,
        Visibility::OnlyMe => false,
    })
}
