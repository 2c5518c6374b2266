/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::approval::ApprovalProcessor;
use crate::config::CoreConfig;
use crate::delivery::{ActivityTransport, HttpTransport};
use crate::delivery_queue::DeliveryQueue;
use crate::domain_perms::DomainPermissionStore;
use crate::events::{self, GateEvent};
use crate::gate::InteractionGate;
use crate::interaction_requests::InteractionRequestStore;
use crate::notifications::Notifier;
use crate::policy::{DomainPermission, PolicyEvaluator};
use crate::poll_tally::PollTally;
use crate::polls::PollProcessor;
use crate::social_db::SocialDb;
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Everything the core runs, wired to one database file.
pub struct Core {
    pub db: SocialDb,
    pub requests: InteractionRequestStore,
    pub approvals: ApprovalProcessor,
    pub gate: InteractionGate,
    pub tally: PollTally,
    pub polls: PollProcessor,
    pub domains: DomainPermissionStore,
    pub queue: DeliveryQueue,
    pub notifier: Notifier,
    events: broadcast::Sender<GateEvent>,
    shutdown_tx: watch::Sender<bool>,
}

/// `RUST_LOG` wins over `default_filter`. Safe to call more than once.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}

impl Core {
    /// Starts the core with HTTP delivery. Must run inside a Tokio runtime.
    pub async fn start(cfg: CoreConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            Duration::from_secs(cfg.http_timeout_secs.max(1)),
            cfg.http_attempts,
        )?;
        Self::start_with_transport(cfg, Arc::new(transport)).await
    }

    pub async fn start_with_transport(
        cfg: CoreConfig,
        transport: Arc<dyn ActivityTransport>,
    ) -> Result<Self> {
        init_tracing(&cfg.log_filter);

        let db_path = cfg.db_path()?;
        info!("fedigate core starting, db: {}", db_path.display());

        let (db, queue, domains) = tokio::task::spawn_blocking({
            let cfg = cfg.clone();
            move || -> Result<(SocialDb, DeliveryQueue, DomainPermissionStore)> {
                let db = SocialDb::open(&db_path)?;
                let queue = DeliveryQueue::open(&db_path)?;
                let domains = DomainPermissionStore::new(db.clone());
                seed_domains(&domains, &cfg)?;
                Ok((db, queue, domains))
            }
        })
        .await
        .context("open core storage")??;

        let events = events::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        queue.start_worker(shutdown_rx.clone(), transport, cfg.queue, events.clone());
        let notifier = Notifier::start(
            db.clone(),
            cfg.notification_buffer,
            events.clone(),
            shutdown_rx,
        );

        let domains_dyn: Arc<dyn crate::policy::DomainPermissions> = Arc::new(domains.clone());
        let evaluator = PolicyEvaluator::new(domains_dyn.clone(), Arc::new(db.clone()));
        let tally = PollTally::new(db.path()).with_max_options(cfg.max_poll_options);

        let core = Self {
            requests: InteractionRequestStore::new(db.path()),
            approvals: ApprovalProcessor::new(
                db.clone(),
                queue.clone(),
                notifier.clone(),
                events.clone(),
                &cfg.public_base_url,
            ),
            gate: InteractionGate::new(db.clone(), evaluator, notifier.clone(), events.clone()),
            polls: PollProcessor::new(db.clone(), tally.clone(), domains_dyn, queue.clone()),
            tally,
            domains,
            queue,
            notifier,
            db,
            events,
            shutdown_tx,
        };
        info!("fedigate core started");
        Ok(core)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    /// Stops the delivery and notification workers. Queued jobs stay on disk.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("fedigate core stopping");
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn seed_domains(domains: &DomainPermissionStore, cfg: &CoreConfig) -> Result<()> {
    let seeded = [
        (&cfg.blocked_domains, DomainPermission::Blocked),
        (&cfg.silenced_domains, DomainPermission::Silenced),
    ];
    for (list, permission) in seeded {
        for d in list.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
            domains
                .put_permission(d, permission, None, Some("config"))
                .with_context(|| format!("seed domain permission {d}"))?;
        }
    }
    Ok(())
}
