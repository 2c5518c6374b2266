/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::events::{emit, GateEvent};
use crate::ids::{new_id, now_ms};
use crate::model::InteractionKind;
use crate::social_db::SocialDb;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    PendingReply,
    PendingReblog,
    PendingFavourite,
    Mention,
    Reblog,
    Favourite,
    InteractionAccepted,
    InteractionRejected,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingReply => "pending.reply",
            Self::PendingReblog => "pending.reblog",
            Self::PendingFavourite => "pending.favourite",
            Self::Mention => "mention",
            Self::Reblog => "reblog",
            Self::Favourite => "favourite",
            Self::InteractionAccepted => "interaction.accepted",
            Self::InteractionRejected => "interaction.rejected",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "pending.reply" => Some(Self::PendingReply),
            "pending.reblog" => Some(Self::PendingReblog),
            "pending.favourite" => Some(Self::PendingFavourite),
            "mention" => Some(Self::Mention),
            "reblog" => Some(Self::Reblog),
            "favourite" => Some(Self::Favourite),
            "interaction.accepted" => Some(Self::InteractionAccepted),
            "interaction.rejected" => Some(Self::InteractionRejected),
            _ => None,
        }
    }

    /// Owner-facing kind for an interaction awaiting a decision.
    pub fn pending(kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Reply => Self::PendingReply,
            InteractionKind::Reblog => Self::PendingReblog,
            InteractionKind::Favourite => Self::PendingFavourite,
        }
    }

    /// Owner-facing kind for an interaction that went through.
    pub fn landed(kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Reply => Self::Mention,
            InteractionKind::Reblog => Self::Reblog,
            InteractionKind::Favourite => Self::Favourite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub target_account_id: String,
    pub origin_account_id: String,
    pub status_id: Option<String>,
    pub created_at_ms: i64,
}

/// Fire-and-forget notification creation. `notify` never waits for storage;
/// a background task persists and then announces each notification.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn start(
        db: SocialDb,
        buffer: usize,
        events: broadcast::Sender<GateEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(buffer.max(1));
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    n = rx.recv() => n,
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() { None } else { continue }
                    }
                };
                let Some(n) = next else { break };
                let db = db.clone();
                let stored = tokio::task::spawn_blocking({
                    let n = n.clone();
                    move || db.insert_notification(&n)
                })
                .await;
                match stored {
                    Ok(Ok(())) => {
                        debug!(
                            "notification {} {} -> {}",
                            n.kind.as_str(),
                            n.origin_account_id,
                            n.target_account_id
                        );
                        emit(
                            &events,
                            GateEvent::new(
                                "notification",
                                Some(n.kind.as_str().to_string()),
                                Some(n.id.clone()),
                            ),
                        );
                    }
                    Ok(Err(e)) => warn!("store notification {}: {e:#}", n.id),
                    Err(e) => warn!("notification task failed: {e}"),
                }
            }
            info!("notification worker stopped");
        });
        Self { tx }
    }

    pub fn notify(
        &self,
        kind: NotificationKind,
        origin_account_id: &str,
        target_account_id: &str,
        status_id: Option<&str>,
    ) {
        if origin_account_id == target_account_id {
            return;
        }
        let n = Notification {
            id: new_id(),
            kind,
            target_account_id: target_account_id.to_string(),
            origin_account_id: origin_account_id.to_string(),
            status_id: status_id.map(str::to_string),
            created_at_ms: now_ms(),
        };
        match self.tx.try_send(n) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(n).await.is_err() {
                        warn!("notification worker gone");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                warn!(
                    "notification dropped, worker stopped: {} for {}",
                    n.kind.as_str(),
                    n.target_account_id
                );
            }
        }
    }
}
