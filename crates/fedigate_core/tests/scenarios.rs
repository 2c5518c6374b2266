/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use async_trait::async_trait;
use fedigate_core::config::CoreConfig;
use fedigate_core::delivery::ActivityTransport;
use fedigate_core::gate::{GateOutcome, Interaction};
use fedigate_core::ids::{new_id, now_ms};
use fedigate_core::model::{Account, InteractionKind, Poll, RequestState, Status, Visibility};
use fedigate_core::notifications::NotificationKind;
use fedigate_core::policy::{
    DomainPermission, InteractionPolicy, PolicyDecision, PolicyEvaluator, PolicyRule, PolicyScope,
};
use fedigate_core::runtime::Core;
use fedigate_core::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl ActivityTransport for Outbox {
    async fn deliver(&self, inbox_url: &str, body: &[u8]) -> Result<()> {
        let v: serde_json::Value = serde_json::from_slice(body)?;
        self.sent.lock().unwrap().push((inbox_url.to_string(), v));
        Ok(())
    }
}

struct Harness {
    core: Core,
    outbox: Arc<Outbox>,
    _dir: TempDir,
}

async fn harness(blocked: &[&str]) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let cfg = CoreConfig {
        public_base_url: "https://gate.test".to_string(),
        data_dir: Some(dir.path().to_path_buf()),
        blocked_domains: blocked.iter().map(|d| d.to_string()).collect(),
        ..CoreConfig::default()
    };
    let outbox = Arc::new(Outbox::default());
    let core = Core::start_with_transport(cfg, outbox.clone()).await.unwrap();
    Harness {
        core,
        outbox,
        _dir: dir,
    }
}

async fn wait_for<F: FnMut() -> bool>(mut cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

fn account(h: &Harness, username: &str, domain: Option<&str>) -> Account {
    let a = Account {
        id: new_id(),
        username: username.to_string(),
        domain: domain.map(str::to_string),
        uri: match domain {
            Some(d) => format!("https://{d}/users/{username}"),
            None => format!("https://gate.test/users/{username}"),
        },
        inbox_url: domain.map(|d| format!("https://{d}/users/{username}/inbox")),
        admin: false,
        created_at_ms: now_ms(),
    };
    h.core.db.put_account(&a).unwrap();
    a
}

fn status(author: &Account, visibility: Visibility) -> Status {
    let id = new_id();
    Status {
        uri: format!("{}/statuses/{id}", author.uri),
        id,
        account_id: author.id.clone(),
        in_reply_to_id: None,
        in_reply_to_account_id: None,
        boost_of_id: None,
        mentions: vec![],
        visibility,
        pending_approval: false,
        approved_by_uri: None,
        rejected_by_uri: None,
        interaction_policy: None,
        created_at_ms: now_ms(),
    }
}

fn reply(author: &Account, target: &Status) -> Status {
    let mut s = status(author, Visibility::Public);
    s.in_reply_to_id = Some(target.id.clone());
    s.in_reply_to_account_id = Some(target.account_id.clone());
    s
}

/// Scenario A setup: public status whose replies from strangers need approval.
async fn pending_stranger_reply(h: &Harness) -> (Account, Account, Status, Status, String) {
    let owner = account(h, "alice", None);
    let stranger = account(h, "bob", Some("remote.example"));
    let mut target = status(&owner, Visibility::Public);
    let mut policy = InteractionPolicy::default();
    policy.set_rule(InteractionKind::Reply, PolicyRule::scoped(PolicyScope::Everyone));
    target.interaction_policy = Some(policy);
    h.core.db.put_status(&target).unwrap();

    let r = reply(&stranger, &target);
    let out = h.core.gate.submit(Interaction::Reply(r.clone())).await.unwrap();
    let GateOutcome::Pending(req) = out else {
        panic!("expected a pending request, got {out:?}");
    };
    (owner, stranger, target, r, req.id)
}

#[tokio::test]
async fn scenario_a_stranger_reply_is_pending_and_owner_notified() {
    let h = harness(&[]).await;
    let (owner, stranger, target, r, req_id) = pending_stranger_reply(&h).await;

    let req = h.core.requests.get_request(&req_id).unwrap();
    assert_eq!(req.state, RequestState::Pending);
    assert_eq!(req.kind, InteractionKind::Reply);
    assert_eq!(req.interaction_uri, r.uri);
    assert!(h.core.db.get_status(&r.id).unwrap().unwrap().pending_approval);

    let listed = h.core.requests.list_pending_for_owner(&owner.id, 20, None).unwrap();
    assert_eq!(listed.items.len(), 1);

    assert!(
        wait_for(|| h
            .core
            .db
            .get_notification(NotificationKind::PendingReply, &owner.id, &stranger.id, Some(&target.id))
            .unwrap()
            .is_some())
        .await
    );
}

#[tokio::test]
async fn scenario_b_owner_accept_approves_and_notifies_replier() {
    let h = harness(&[]).await;
    let (owner, stranger, target, r, req_id) = pending_stranger_reply(&h).await;

    let decided = h.core.approvals.accept(&req_id, &owner.id).await.unwrap();
    assert_eq!(decided.state, RequestState::Accepted);
    let approval_uri = decided.decision_uri.clone().unwrap();

    let stored = h.core.db.get_status(&r.id).unwrap().unwrap();
    assert!(!stored.pending_approval);
    assert_eq!(stored.approved_by_uri.as_deref(), Some(approval_uri.as_str()));

    assert!(
        wait_for(|| h
            .core
            .db
            .get_notification(
                NotificationKind::InteractionAccepted,
                &stranger.id,
                &owner.id,
                Some(&target.id)
            )
            .unwrap()
            .is_some())
        .await
    );
    assert!(wait_for(|| !h.outbox.sent.lock().unwrap().is_empty()).await);
    let sent = h.outbox.sent.lock().unwrap();
    assert_eq!(sent[0].0, "https://remote.example/users/bob/inbox");
    assert_eq!(sent[0].1["type"], "Accept");
    assert_eq!(sent[0].1["actor"], owner.uri.as_str());
}

#[tokio::test]
async fn scenario_c_non_owner_reject_is_forbidden() {
    let h = harness(&[]).await;
    let (_owner, stranger, _target, r, req_id) = pending_stranger_reply(&h).await;
    let other = account(&h, "carol", None);

    for who in [&stranger.id, &other.id] {
        let err = h.core.approvals.reject(&req_id, who).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.http_status(), 403);
    }
    let req = h.core.requests.get_request(&req_id).unwrap();
    assert_eq!(req.state, RequestState::Pending);
    assert!(h.core.db.get_status(&r.id).unwrap().unwrap().pending_approval);
    assert_eq!(h.core.queue.stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn scenario_d_revote_on_single_choice_poll_conflicts() {
    let h = harness(&[]).await;
    let owner = account(&h, "alice", None);
    let voter = account(&h, "bob", None);
    let s = status(&owner, Visibility::Public);
    h.core.db.put_status(&s).unwrap();
    let poll = Poll {
        id: new_id(),
        status_id: s.id.clone(),
        options: vec!["yes".to_string(), "no".to_string()],
        multiple: false,
        expires_at_ms: Some(now_ms() + 3_600_000),
        created_at_ms: now_ms(),
    };
    h.core.tally.put_poll(&poll).unwrap();

    let view = h.core.polls.vote(&voter.id, &poll.id, &[0]).await.unwrap();
    assert_eq!(view.counts, vec![1, 0]);

    let err = h.core.polls.vote(&voter.id, &poll.id, &[1]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let counts = h.core.tally.count_votes(&poll.id).unwrap();
    assert_eq!(counts.options, vec![1, 0]);
    assert_eq!(counts.voters, 1);
    assert_eq!(h.core.tally.get_vote_by(&poll.id, &voter.id).unwrap().choices, vec![0]);

    // Deleting the status takes the poll and its votes with it.
    assert!(h.core.db.delete_status(&s.id).unwrap());
    assert_eq!(h.core.tally.get_poll(&poll.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert!(h.core.tally.get_poll_votes(&poll.id).unwrap().is_empty());
}

#[tokio::test]
async fn scenario_e_blocked_domain_is_forbidden_regardless_of_policy() {
    let h = harness(&["blocked.example"]).await;
    let owner = account(&h, "alice", None);
    let troll = account(&h, "troll", Some("sub.blocked.example"));
    h.core.db.add_follow(&troll.id, &owner.id).unwrap();

    let mut target = status(&owner, Visibility::Public);
    target.mentions = vec![troll.id.clone()];
    let mut rule = PolicyRule::scoped(PolicyScope::Everyone);
    rule.automatic_approval.insert(troll.id.clone());
    let mut policy = InteractionPolicy::default();
    for kind in InteractionKind::ALL {
        policy.set_rule(kind, rule.clone());
    }
    target.interaction_policy = Some(policy);
    h.core.db.put_status(&target).unwrap();

    let evaluator = PolicyEvaluator::new(
        Arc::new(h.core.domains.clone()),
        Arc::new(h.core.db.clone()),
    );
    for kind in InteractionKind::ALL {
        assert_eq!(
            evaluator.evaluate(&target, &troll, kind).unwrap(),
            PolicyDecision::Forbid
        );
    }

    let r = reply(&troll, &target);
    let err = h.core.gate.submit(Interaction::Reply(r.clone())).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(h.core.db.get_status(&r.id).unwrap().is_none());
    assert!(h.core.requests.get_request_by_uri(&r.uri).is_err());
    assert_eq!(
        h.core.domains.list_permissions().unwrap()[0].permission,
        DomainPermission::Blocked
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_voters_are_counted_exactly() {
    let h = harness(&[]).await;
    let owner = account(&h, "alice", None);
    let s = status(&owner, Visibility::Public);
    h.core.db.put_status(&s).unwrap();
    let poll = Poll {
        id: new_id(),
        status_id: s.id.clone(),
        options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        multiple: true,
        expires_at_ms: None,
        created_at_ms: now_ms(),
    };
    h.core.tally.put_poll(&poll).unwrap();

    let voters: Vec<Account> = (0..12).map(|i| account(&h, &format!("v{i}"), None)).collect();
    let mut handles = Vec::new();
    for (i, v) in voters.iter().enumerate() {
        let polls = h.core.polls.clone();
        let voter_id = v.id.clone();
        let poll_id = poll.id.clone();
        let choices = if i % 2 == 0 { vec![0, 1] } else { vec![2] };
        handles.push(tokio::spawn(async move {
            polls.vote(&voter_id, &poll_id, &choices).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let counts = h.core.tally.count_votes(&poll.id).unwrap();
    assert_eq!(counts.options, vec![6, 6, 6]);
    assert_eq!(counts.voters, 12);
}
