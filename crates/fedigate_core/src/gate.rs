/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{GateError, GateResult};
use crate::events::{emit, GateEvent};
use crate::interaction_requests::{find_request_by_uri, insert_request};
use crate::model::{Favourite, InteractionKind, InteractionRequest, RequestState, Status};
use crate::notifications::{NotificationKind, Notifier};
use crate::policy::{PolicyDecision, PolicyEvaluator};
use crate::social_db::{
    connect, favourite_by_uri, insert_favourite, insert_status, is_constraint_violation,
    status_by_uri, SocialDb,
};
use anyhow::Context;
use rusqlite::{Connection, TransactionBehavior};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// An attempted interaction together with the object it would create.
#[derive(Debug, Clone)]
pub enum Interaction {
    /// A status with `in_reply_to_id` set.
    Reply(Status),
    /// A status with `boost_of_id` set.
    Reblog(Status),
    Favourite(Favourite),
}

impl Interaction {
    pub fn kind(&self) -> InteractionKind {
        match self {
            Self::Reply(_) => InteractionKind::Reply,
            Self::Reblog(_) => InteractionKind::Reblog,
            Self::Favourite(_) => InteractionKind::Favourite,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::Reply(s) | Self::Reblog(s) => &s.uri,
            Self::Favourite(f) => &f.uri,
        }
    }

    pub fn account_id(&self) -> &str {
        match self {
            Self::Reply(s) | Self::Reblog(s) => &s.account_id,
            Self::Favourite(f) => &f.account_id,
        }
    }

    pub fn target_status_id(&self) -> Option<&str> {
        match self {
            Self::Reply(s) => s.in_reply_to_id.as_deref(),
            Self::Reblog(s) => s.boost_of_id.as_deref(),
            Self::Favourite(f) => Some(f.status_id.as_str()),
        }
    }

    fn set_pending(&mut self, pending: bool) {
        match self {
            Self::Reply(s) | Self::Reblog(s) => s.pending_approval = pending,
            Self::Favourite(f) => f.pending_approval = pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Stored as approved; the interaction is visible right away.
    Allowed,
    /// Stored pending; the owner has to decide the request.
    Pending(InteractionRequest),
}

/// Entry point for every reply, boost and favourite, local or federated.
#[derive(Clone)]
pub struct InteractionGate {
    db: SocialDb,
    evaluator: PolicyEvaluator,
    notifier: Notifier,
    events: broadcast::Sender<GateEvent>,
}

impl InteractionGate {
    pub fn new(
        db: SocialDb,
        evaluator: PolicyEvaluator,
        notifier: Notifier,
        events: broadcast::Sender<GateEvent>,
    ) -> Self {
        Self {
            db,
            evaluator,
            notifier,
            events,
        }
    }

    pub async fn submit(&self, interaction: Interaction) -> GateResult<GateOutcome> {
        let kind = interaction.kind();
        let uri = interaction.uri().to_string();
        let account_id = interaction.account_id().to_string();

        let (outcome, owner_id, status_id, fresh) = tokio::task::spawn_blocking({
            let this = self.clone();
            move || this.submit_blocking(interaction)
        })
        .await??;

        if !fresh {
            debug!("interaction {uri} already allowed");
            return Ok(outcome);
        }
        let notification = match &outcome {
            GateOutcome::Allowed => NotificationKind::landed(kind),
            GateOutcome::Pending(_) => NotificationKind::pending(kind),
        };
        self.notifier
            .notify(notification, &account_id, &owner_id, Some(&status_id));
        match &outcome {
            GateOutcome::Allowed => {
                info!("{} {uri} by {account_id} on {status_id} allowed", kind.as_str());
            }
            GateOutcome::Pending(req) => {
                info!(
                    "{} {uri} by {account_id} on {status_id} pending as request {}",
                    kind.as_str(),
                    req.id
                );
                emit(
                    &self.events,
                    GateEvent::new(
                        "interaction.pending",
                        Some(kind.as_str().to_string()),
                        Some(req.id.clone()),
                    ),
                );
            }
        }
        Ok(outcome)
    }

    /// Returns the outcome, the status owner, the target status, and whether
    /// anything new was stored.
    fn submit_blocking(
        &self,
        mut interaction: Interaction,
    ) -> GateResult<(GateOutcome, String, String, bool)> {
        let kind = interaction.kind();
        let uri = interaction.uri().to_string();
        let target_id = interaction
            .target_status_id()
            .ok_or_else(|| GateError::invalid(format!("{} {uri} has no target", kind.as_str())))?
            .to_string();

        let target = self
            .db
            .get_status(&target_id)?
            .ok_or_else(|| GateError::not_found(format!("status {target_id}")))?;
        let requester = self
            .db
            .get_account(interaction.account_id())?
            .ok_or_else(|| {
                GateError::not_found(format!("account {}", interaction.account_id()))
            })?;

        let mut conn = connect(self.db.path())?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin interaction transaction")?;

        if seen_before(&tx, kind, &uri)? {
            return Ok((GateOutcome::Allowed, target.account_id, target.id, false));
        }

        let decision = self
            .evaluator
            .evaluate(&target, &requester, kind)
            .with_context(|| format!("evaluate {} {uri}", kind.as_str()))?;

        let outcome = match decision {
            PolicyDecision::Forbid => {
                return Err(GateError::forbidden(format!(
                    "{} by {} not permitted on status {}",
                    kind.as_str(),
                    requester.id,
                    target.id
                )));
            }
            PolicyDecision::Allow => {
                interaction.set_pending(false);
                store_object(&tx, &interaction)?;
                GateOutcome::Allowed
            }
            PolicyDecision::RequireApproval => {
                interaction.set_pending(true);
                let req = insert_request(&tx, &uri, kind, &target.id, &requester.id)?;
                store_object(&tx, &interaction)?;
                GateOutcome::Pending(req)
            }
        };
        tx.commit()
            .with_context(|| format!("commit {} {uri}", kind.as_str()))?;
        Ok((outcome, target.account_id, target.id, true))
    }
}

/// Settles a resubmitted URI from what is already stored. Returns true when
/// the interaction already landed, false when it has never been seen.
///
/// A gated interaction only leaves `Pending` through its request, so a stored
/// request decides the outcome regardless of what the policy says now.
fn seen_before(conn: &Connection, kind: InteractionKind, uri: &str) -> GateResult<bool> {
    if let Some(req) = find_request_by_uri(conn, uri)? {
        return match req.state {
            RequestState::Pending => Err(GateError::conflict(format!(
                "{} {uri} is awaiting approval as request {}",
                kind.as_str(),
                req.id
            ))),
            RequestState::Accepted => Ok(true),
            RequestState::Rejected => Err(GateError::forbidden(format!(
                "{} {uri} was rejected by {}",
                kind.as_str(),
                req.decision_uri.as_deref().unwrap_or("the status owner")
            ))),
        };
    }
    let marks = match kind {
        InteractionKind::Reply | InteractionKind::Reblog => status_by_uri(conn, uri)?
            .map(|s| (s.pending_approval, s.rejected_by_uri.is_some())),
        InteractionKind::Favourite => favourite_by_uri(conn, uri)?
            .map(|f| (f.pending_approval, f.rejected_by_uri.is_some())),
    };
    match marks {
        None => Ok(false),
        Some((_, true)) => Err(GateError::forbidden(format!(
            "{} {uri} was rejected",
            kind.as_str()
        ))),
        Some((true, false)) => Err(GateError::conflict(format!(
            "{} {uri} is awaiting approval",
            kind.as_str()
        ))),
        Some((false, false)) => Ok(true),
    }
}

fn store_object(conn: &Connection, interaction: &Interaction) -> GateResult<()> {
    let res = match interaction {
        Interaction::Reply(s) | Interaction::Reblog(s) => insert_status(conn, s),
        Interaction::Favourite(f) => insert_favourite(conn, f),
    };
    res.map_err(|e| {
        if e.downcast_ref::<rusqlite::Error>()
            .is_some_and(is_constraint_violation)
        {
            GateError::conflict(format!("{} is already stored", interaction.uri()))
        } else {
            e.into()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalProcessor;
    use crate::delivery_queue::DeliveryQueue;
    use crate::error::ErrorKind;
    use crate::events;
    use crate::interaction_requests::InteractionRequestStore;
    use crate::ids::{new_id, now_ms};
    use crate::model::{Account, RequestState, Visibility};
    use crate::notifications::tests::wait_for;
    use crate::policy::tests::FakeDomains;
    use crate::policy::DomainPermission;
    use crate::social_db::tests::{
        create_test_db, local_account, public_status, remote_account, unsaved_status,
    };
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::watch;

    struct Fixture {
        db: SocialDb,
        gate: InteractionGate,
        approvals: ApprovalProcessor,
        _stop: watch::Sender<bool>,
        _dir: TempDir,
    }

    fn fixture(domains: FakeDomains) -> Fixture {
        let (db, dir) = create_test_db();
        let queue = DeliveryQueue::open(db.path()).unwrap();
        let events = events::channel(16);
        let (stop, stop_rx) = watch::channel(false);
        let notifier = Notifier::start(db.clone(), 16, events.clone(), stop_rx);
        let evaluator = PolicyEvaluator::new(Arc::new(domains), Arc::new(db.clone()));
        Fixture {
            gate: InteractionGate::new(db.clone(), evaluator, notifier.clone(), events.clone()),
            approvals: ApprovalProcessor::new(
                db.clone(),
                queue,
                notifier,
                events,
                "https://local.test",
            ),
            db,
            _stop: stop,
            _dir: dir,
        }
    }

    async fn pending_request(f: &Fixture, reply: &Status) -> InteractionRequest {
        match f.gate.submit(Interaction::Reply(reply.clone())).await.unwrap() {
            GateOutcome::Pending(req) => req,
            other => panic!("expected pending, got {other:?}"),
        }
    }

    fn reply_to(author: &Account, target: &Status) -> Status {
        let mut s = unsaved_status(author);
        s.in_reply_to_id = Some(target.id.clone());
        s.in_reply_to_account_id = Some(target.account_id.clone());
        s
    }

    fn fave(author: &Account, target: &Status) -> Favourite {
        let id = new_id();
        Favourite {
            uri: format!("{}/likes/{id}", author.uri),
            id,
            account_id: author.id.clone(),
            status_id: target.id.clone(),
            pending_approval: false,
            approved_by_uri: None,
            rejected_by_uri: None,
            created_at_ms: now_ms(),
        }
    }

    #[tokio::test]
    async fn follower_favourite_is_stored_approved() {
        let f = fixture(FakeDomains::default());
        let owner = local_account(&f.db, "alice");
        let fan = remote_account(&f.db, "fan", "remote.example");
        f.db.add_follow(&fan.id, &owner.id).unwrap();
        let target = public_status(&f.db, &owner);
        let like = fave(&fan, &target);

        let out = f.gate.submit(Interaction::Favourite(like.clone())).await.unwrap();
        assert_eq!(out, GateOutcome::Allowed);
        let stored = f.db.get_favourite_by_uri(&like.uri).unwrap().unwrap();
        assert!(!stored.pending_approval);

        // Same URI again does not create anything new.
        let again = f.gate.submit(Interaction::Favourite(like)).await.unwrap();
        assert_eq!(again, GateOutcome::Allowed);
        assert!(
            wait_for(|| f
                .db
                .get_notification(NotificationKind::Favourite, &owner.id, &fan.id, Some(&target.id))
                .unwrap()
                .is_some())
            .await
        );
    }

    #[tokio::test]
    async fn stranger_reply_is_pending_and_resubmit_conflicts() {
        let f = fixture(FakeDomains::default());
        let owner = local_account(&f.db, "alice");
        let stranger = remote_account(&f.db, "eve", "remote.example");
        let target = public_status(&f.db, &owner);
        let reply = reply_to(&stranger, &target);

        let out = f.gate.submit(Interaction::Reply(reply.clone())).await.unwrap();
        let GateOutcome::Pending(req) = out else {
            panic!("expected pending, got {out:?}");
        };
        assert_eq!(req.state, RequestState::Pending);
        assert_eq!(req.interaction_uri, reply.uri);
        assert!(f.db.get_status(&reply.id).unwrap().unwrap().pending_approval);

        let err = f.gate.submit(Interaction::Reply(reply)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn forbidden_interaction_stores_nothing() {
        let mut domains = FakeDomains::default();
        domains
            .0
            .insert("bad.example".to_string(), DomainPermission::Blocked);
        let f = fixture(domains);
        let owner = local_account(&f.db, "alice");
        let troll = remote_account(&f.db, "troll", "bad.example");
        let target = public_status(&f.db, &owner);
        let reply = reply_to(&troll, &target);

        let err = f.gate.submit(Interaction::Reply(reply.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(f.db.get_status(&reply.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn boost_of_followers_only_is_forbidden_and_missing_target_is_not_found() {
        let f = fixture(FakeDomains::default());
        let owner = local_account(&f.db, "alice");
        let fan = local_account(&f.db, "fan");
        f.db.add_follow(&fan.id, &owner.id).unwrap();
        let mut target = unsaved_status(&owner);
        target.visibility = Visibility::FollowersOnly;
        f.db.put_status(&target).unwrap();

        let mut boost = unsaved_status(&fan);
        boost.boost_of_id = Some(target.id.clone());
        let err = f.gate.submit(Interaction::Reblog(boost)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let mut orphan = unsaved_status(&fan);
        orphan.in_reply_to_id = Some("missing".to_string());
        let err = f.gate.submit(Interaction::Reply(orphan)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let loose = unsaved_status(&fan);
        let err = f.gate.submit(Interaction::Reply(loose)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn rejected_reply_stays_rejected_on_resubmit() {
        let f = fixture(FakeDomains::default());
        let owner = local_account(&f.db, "alice");
        let stranger = remote_account(&f.db, "eve", "remote.example");
        let target = public_status(&f.db, &owner);
        let reply = reply_to(&stranger, &target);
        let req = pending_request(&f, &reply).await;
        let decided = f.approvals.reject(&req.id, &owner.id).await.unwrap();

        let err = f.gate.submit(Interaction::Reply(reply.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        // Following the owner afterwards does not reopen it either.
        f.db.add_follow(&stranger.id, &owner.id).unwrap();
        let err = f.gate.submit(Interaction::Reply(reply.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let stored = f.db.get_status(&reply.id).unwrap().unwrap();
        assert!(!stored.pending_approval);
        assert_eq!(stored.approved_by_uri, None);
        assert_eq!(stored.rejected_by_uri, decided.decision_uri);
    }

    #[tokio::test]
    async fn pending_reply_is_not_released_when_policy_later_allows() {
        let f = fixture(FakeDomains::default());
        let owner = local_account(&f.db, "alice");
        let stranger = remote_account(&f.db, "eve", "remote.example");
        let target = public_status(&f.db, &owner);
        let reply = reply_to(&stranger, &target);
        let req = pending_request(&f, &reply).await;

        f.db.add_follow(&stranger.id, &owner.id).unwrap();
        let err = f.gate.submit(Interaction::Reply(reply.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = f.db.get_status(&reply.id).unwrap().unwrap();
        assert!(stored.pending_approval);
        assert_eq!(stored.approved_by_uri, None);
        let requests = InteractionRequestStore::new(f.db.path());
        assert_eq!(requests.get_request(&req.id).unwrap().state, RequestState::Pending);

        // Only the owner's decision releases it.
        let decided = f.approvals.accept(&req.id, &owner.id).await.unwrap();
        let again = f.gate.submit(Interaction::Reply(reply.clone())).await.unwrap();
        assert_eq!(again, GateOutcome::Allowed);
        let stored = f.db.get_status(&reply.id).unwrap().unwrap();
        assert!(!stored.pending_approval);
        assert_eq!(stored.approved_by_uri, decided.decision_uri);
    }

    #[tokio::test]
    async fn rejected_favourite_without_request_is_forbidden() {
        let f = fixture(FakeDomains::default());
        let owner = local_account(&f.db, "alice");
        let fan = remote_account(&f.db, "fan", "remote.example");
        f.db.add_follow(&fan.id, &owner.id).unwrap();
        let target = public_status(&f.db, &owner);
        let mut like = fave(&fan, &target);
        like.rejected_by_uri = Some("https://local.test/users/alice/rejects/1".to_string());
        f.db.put_favourite(&like).unwrap();

        let err = f.gate.submit(Interaction::Favourite(like.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let stored = f.db.get_favourite_by_uri(&like.uri).unwrap().unwrap();
        assert_eq!(stored.rejected_by_uri, like.rejected_by_uri);
    }
}
