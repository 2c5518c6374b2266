/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::delivery_queue::{enqueue_tx, DeliveryQueue};
use crate::error::{GateError, GateResult};
use crate::events::{emit, GateEvent};
use crate::ids::{new_id, now_ms, rfc3339_ms};
use crate::interaction_requests::{get_request_tx, transition_tx};
use crate::model::{Account, InteractionRequest, RequestState};
use crate::notifications::{NotificationKind, Notifier};
use crate::social_db::{connect, mark_interaction_decided, SocialDb};
use anyhow::Context;
use fedigate_protocol::{ActivityType, DecisionActivity, AS_CONTEXT};
use rusqlite::TransactionBehavior;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn state(self) -> RequestState {
        match self {
            Self::Accept => RequestState::Accepted,
            Self::Reject => RequestState::Rejected,
        }
    }

    fn path_segment(self) -> &'static str {
        match self {
            Self::Accept => "accepts",
            Self::Reject => "rejects",
        }
    }

    fn activity_type(self) -> ActivityType {
        match self {
            Self::Accept => ActivityType::Accept,
            Self::Reject => ActivityType::Reject,
        }
    }

    fn notification(self) -> NotificationKind {
        match self {
            Self::Accept => NotificationKind::InteractionAccepted,
            Self::Reject => NotificationKind::InteractionRejected,
        }
    }
}

/// Applies a status owner's decision on a pending interaction.
///
/// The state transition, the update of the interacting object and the
/// outbound Accept/Reject job are written in one transaction. Delivery and
/// notification happen afterwards and never undo the decision.
#[derive(Clone)]
pub struct ApprovalProcessor {
    db: SocialDb,
    queue: DeliveryQueue,
    notifier: Notifier,
    events: broadcast::Sender<GateEvent>,
    public_base_url: String,
}

impl ApprovalProcessor {
    pub fn new(
        db: SocialDb,
        queue: DeliveryQueue,
        notifier: Notifier,
        events: broadcast::Sender<GateEvent>,
        public_base_url: &str,
    ) -> Self {
        Self {
            db,
            queue,
            notifier,
            events,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn accept(&self, request_id: &str, deciding_account_id: &str) -> GateResult<InteractionRequest> {
        self.decide(request_id, deciding_account_id, Decision::Accept)
            .await
    }

    pub async fn reject(&self, request_id: &str, deciding_account_id: &str) -> GateResult<InteractionRequest> {
        self.decide(request_id, deciding_account_id, Decision::Reject)
            .await
    }

    async fn decide(
        &self,
        request_id: &str,
        deciding_account_id: &str,
        decision: Decision,
    ) -> GateResult<InteractionRequest> {
        let (req, status_id, queued) = tokio::task::spawn_blocking({
            let this = self.clone();
            let request_id = request_id.to_string();
            let deciding_account_id = deciding_account_id.to_string();
            move || this.decide_blocking(&request_id, &deciding_account_id, decision)
        })
        .await??;

        if queued > 0 {
            self.queue.wake();
        }
        self.notifier.notify(
            decision.notification(),
            deciding_account_id,
            &req.account_id,
            Some(&status_id),
        );
        if decision == Decision::Accept {
            // The owner now gets the notification the gate held back.
            self.notifier.notify(
                NotificationKind::landed(req.kind),
                &req.account_id,
                deciding_account_id,
                Some(&status_id),
            );
        }
        emit(
            &self.events,
            GateEvent::new(
                "interaction.decided",
                Some(format!("{:?}", req.state).to_lowercase()),
                Some(req.id.clone()),
            ),
        );
        info!(
            "interaction request {} {} by {} ({} deliveries queued)",
            req.id,
            decision.path_segment(),
            deciding_account_id,
            queued
        );
        Ok(req)
    }

    fn decide_blocking(
        &self,
        request_id: &str,
        deciding_account_id: &str,
        decision: Decision,
    ) -> GateResult<(InteractionRequest, String, u64)> {
        let mut conn = connect(self.db.path())?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin decision transaction")?;

        let req = get_request_tx(&tx, request_id)?
            .ok_or_else(|| GateError::not_found(format!("interaction request {request_id}")))?;
        let status = self
            .db
            .get_status(&req.status_id)?
            .ok_or_else(|| GateError::not_found(format!("status {}", req.status_id)))?;
        if status.account_id != deciding_account_id {
            return Err(GateError::forbidden(format!(
                "account {deciding_account_id} does not own status {}",
                status.id
            )));
        }
        if req.state.is_terminal() {
            return Err(GateError::conflict(format!(
                "interaction request {} already {:?}",
                req.id, req.state
            )));
        }

        let owner = self
            .db
            .get_account(&status.account_id)?
            .ok_or_else(|| GateError::not_found(format!("account {}", status.account_id)))?;
        let interactor = self.db.get_account(&req.account_id)?;

        let decided_at = now_ms();
        let decision_uri = self.decision_uri(&owner, decision);
        if !transition_tx(&tx, &req.id, decision.state(), &decision_uri, decided_at)? {
            return Err(GateError::conflict(format!(
                "interaction request {} was decided concurrently",
                req.id
            )));
        }
        let touched = mark_interaction_decided(
            &tx,
            req.kind,
            &req.interaction_uri,
            &decision_uri,
            decision == Decision::Accept,
        )?;
        if touched == 0 {
            warn!(
                "interaction {} for request {} not stored locally",
                req.interaction_uri, req.id
            );
        }

        let mut queued = 0;
        if let Some(inbox) = interactor.as_ref().and_then(|a| a.inbox_url.clone()) {
            let activity = DecisionActivity {
                context: AS_CONTEXT.to_string(),
                id: decision_uri.clone(),
                kind: decision.activity_type(),
                actor: owner.uri.clone(),
                object: req.interaction_uri.clone(),
                target: status.uri.clone(),
                to: interactor.iter().map(|a| a.uri.clone()).collect(),
                published: rfc3339_ms(decided_at),
            };
            let body = serde_json::to_vec(&activity).context("encode decision activity")?;
            queued = enqueue_tx(&tx, &body, &[inbox])?;
        }

        tx.commit()
            .with_context(|| format!("commit decision on request {}", req.id))?;

        let decided = InteractionRequest {
            state: decision.state(),
            decided_at_ms: Some(decided_at),
            decision_uri: Some(decision_uri),
            ..req
        };
        Ok((decided, status.id, queued))
    }

    fn decision_uri(&self, owner: &Account, decision: Decision) -> String {
        format!(
            "{}/users/{}/{}/{}",
            self.public_base_url,
            owner.username,
            decision.path_segment(),
            new_id()
        )
    }
}
