/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::delivery::{is_permanent, ActivityTransport};
use crate::events::{emit, GateEvent};
use crate::ids::{new_id, now_ms};
use crate::social_db::connect;
use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use rusqlite::{params, Connection, Transaction};
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::{broadcast, watch, Notify};
use tracing::{info, warn};

const STATUS_PENDING: i64 = 0;
const STATUS_DELIVERED: i64 = 1;
const STATUS_DEAD: i64 = 2;

/// Durable outbound queue. Jobs are rows in `delivery_jobs`; a worker task
/// delivers due jobs, reschedules failures with exponential backoff and marks
/// a job dead once it runs out of attempts.
#[derive(Clone)]
pub struct DeliveryQueue {
    db_path: PathBuf,
    notify: Arc<Notify>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub batch_size: u32,
    pub tick_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff_secs: 5,
            max_backoff_secs: 3600,
            batch_size: 40,
            tick_ms: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub pending: u64,
    pub delivered: u64,
    pub dead: u64,
}

#[derive(Debug, Clone)]
pub struct DeadJob {
    pub id: String,
    pub target: String,
    pub activity_id: Option<String>,
    pub attempt: u32,
    pub last_error: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
struct Job {
    id: String,
    attempt: u32,
    target: String,
    activity_json: Vec<u8>,
    activity_id: Option<String>,
}

impl DeliveryQueue {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        init_db(&db_path)?;
        Ok(Self {
            db_path,
            notify: Arc::new(Notify::new()),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Wakes the worker, e.g. after jobs were inserted through [`enqueue_tx`].
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub async fn enqueue_activity(&self, activity_json: Vec<u8>, targets: Vec<String>) -> Result<u64> {
        let count = tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            move || -> Result<u64> {
                let mut conn = connect(&db_path)?;
                let tx = conn.transaction()?;
                let n = enqueue_tx(&tx, &activity_json, &targets)?;
                tx.commit()?;
                Ok(n)
            }
        })
        .await??;

        self.wake();
        Ok(count)
    }

    pub fn start_worker(
        &self,
        shutdown: watch::Receiver<bool>,
        transport: Arc<dyn ActivityTransport>,
        settings: QueueSettings,
        events: broadcast::Sender<GateEvent>,
    ) {
        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.run_loop(shutdown, transport, settings, events).await {
                warn!("delivery worker stopped: {e:#}");
            }
        });
    }

    async fn run_loop(
        &self,
        mut shutdown: watch::Receiver<bool>,
        transport: Arc<dyn ActivityTransport>,
        settings: QueueSettings,
        events: broadcast::Sender<GateEvent>,
    ) -> Result<()> {
        info!("delivery queue db: {}", self.db_path.display());

        let tick = Duration::from_millis(settings.tick_ms.max(10));
        loop {
            if *shutdown.borrow() {
                break;
            }

            // A failed fetch is retried on the next tick.
            let jobs = match self.fetch_due_jobs(settings.batch_size.max(1)).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!("fetch due delivery jobs: {e:#}");
                    Vec::new()
                }
            };
            if jobs.is_empty() {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = tokio::time::sleep(tick) => {}
                    res = shutdown.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            // Same body to the same inbox is sent once.
            let mut groups: HashMap<(String, String), Vec<Job>> = HashMap::new();
            for job in jobs {
                let body_hash = short_body_hash(&job.activity_json);
                groups
                    .entry((job.target.clone(), body_hash))
                    .or_default()
                    .push(job);
            }

            for ((inbox_url, _), jobs) in groups {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = self
                    .process_group(transport.as_ref(), &settings, &inbox_url, jobs, &events)
                    .await
                {
                    warn!("delivery group error: {e:#}");
                }
            }
        }
        Ok(())
    }

    async fn process_group(
        &self,
        transport: &dyn ActivityTransport,
        settings: &QueueSettings,
        inbox_url: &str,
        jobs: Vec<Job>,
        events: &broadcast::Sender<GateEvent>,
    ) -> Result<()> {
        let Some(first) = jobs.first() else {
            return Ok(());
        };
        let body = first.activity_json.clone();
        match transport.deliver(inbox_url, &body).await {
            Ok(()) => {
                for j in jobs {
                    self.mark_delivered(&j.id).await?;
                }
            }
            Err(e) => {
                let permanent = is_permanent(&e);
                for j in jobs {
                    let attempt_no = j.attempt.saturating_add(1);
                    if permanent || attempt_no >= settings.max_attempts {
                        warn!(
                            "delivery dead job_id={} target={} activity_id={:?} attempts={}: {e:#}",
                            j.id, j.target, j.activity_id, attempt_no
                        );
                        self.mark_dead(&j.id, attempt_no, &format!("{e:#}")).await?;
                        emit(
                            events,
                            GateEvent::new("delivery.dead", Some(j.target.clone()), j.activity_id.clone()),
                        );
                        continue;
                    }
                    let delay = next_backoff(
                        attempt_no,
                        settings.base_backoff_secs,
                        settings.max_backoff_secs,
                    );
                    info!(
                        "delivery retry job_id={} target={} attempt={} in {:?}",
                        j.id, j.target, attempt_no, delay
                    );
                    self.reschedule(&j.id, attempt_no, delay, &format!("{e:#}"))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn fetch_due_jobs(&self, limit: u32) -> Result<Vec<Job>> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            move || -> Result<Vec<Job>> {
                let conn = connect(&db_path)?;
                let now = now_ms();
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, attempt, target, activity_json, activity_id
                    FROM delivery_jobs
                    WHERE status = ?1 AND next_attempt_at_ms <= ?2
                    ORDER BY next_attempt_at_ms ASC
                    LIMIT ?3
                    "#,
                )?;
                let mut rows = stmt.query(params![STATUS_PENDING, now, limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(Job {
                        id: row.get(0)?,
                        attempt: row.get(1)?,
                        target: row.get(2)?,
                        activity_json: row.get(3)?,
                        activity_id: row.get(4)?,
                    });
                }
                Ok(out)
            }
        })
        .await?
    }

    async fn mark_delivered(&self, id: &str) -> Result<()> {
        self.update_job(
            "UPDATE delivery_jobs SET status = ?2, last_error = NULL WHERE id = ?1",
            id,
            STATUS_DELIVERED,
        )
        .await
    }

    async fn mark_dead(&self, id: &str, attempt: u32, err: &str) -> Result<()> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let id = id.to_string();
            let err = err.to_string();
            move || -> Result<()> {
                let conn = connect(&db_path)?;
                conn.execute(
                    "UPDATE delivery_jobs SET status = ?2, attempt = ?3, last_error = ?4 WHERE id = ?1",
                    params![id, STATUS_DEAD, attempt, err],
                )?;
                Ok(())
            }
        })
        .await?
    }

    async fn reschedule(&self, id: &str, attempt: u32, delay: Duration, err: &str) -> Result<()> {
        let next = now_ms().saturating_add(delay.as_millis() as i64);
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let id = id.to_string();
            let err = err.to_string();
            move || -> Result<()> {
                let conn = connect(&db_path)?;
                conn.execute(
                    "UPDATE delivery_jobs SET attempt = ?2, next_attempt_at_ms = ?3, last_error = ?4 WHERE id = ?1",
                    params![id, attempt, next, err],
                )?;
                Ok(())
            }
        })
        .await?
    }

    async fn update_job(&self, sql: &'static str, id: &str, status: i64) -> Result<()> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let id = id.to_string();
            move || -> Result<()> {
                let conn = connect(&db_path)?;
                conn.execute(sql, params![id, status])?;
                Ok(())
            }
        })
        .await?
    }

    /// Re-arms a dead job for immediate delivery with a fresh attempt budget.
    pub async fn retry_dead(&self, id: &str) -> Result<bool> {
        let changed = tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let id = id.to_string();
            move || -> Result<usize> {
                let conn = connect(&db_path)?;
                Ok(conn.execute(
                    "UPDATE delivery_jobs SET status = ?2, attempt = 0, next_attempt_at_ms = ?3 WHERE id = ?1 AND status = ?4",
                    params![id, STATUS_PENDING, now_ms(), STATUS_DEAD],
                )?)
            }
        })
        .await??;
        if changed > 0 {
            self.wake();
        }
        Ok(changed > 0)
    }

    pub async fn list_dead(&self, limit: u32) -> Result<Vec<DeadJob>> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            move || -> Result<Vec<DeadJob>> {
                let conn = connect(&db_path)?;
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, target, activity_id, attempt, last_error, created_at_ms
                    FROM delivery_jobs
                    WHERE status = ?1
                    ORDER BY created_at_ms DESC
                    LIMIT ?2
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![STATUS_DEAD, limit.clamp(1, 1000)], |r| {
                        Ok(DeadJob {
                            id: r.get(0)?,
                            target: r.get(1)?,
                            activity_id: r.get(2)?,
                            attempt: r.get(3)?,
                            last_error: r.get(4)?,
                            created_at_ms: r.get(5)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            }
        })
        .await?
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            move || -> Result<QueueStats> {
                let conn = connect(&db_path)?;
                let count = |status: i64| -> Result<u64> {
                    let n: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM delivery_jobs WHERE status = ?1",
                        params![status],
                        |r| r.get(0),
                    )?;
                    Ok(n.max(0) as u64)
                };
                Ok(QueueStats {
                    pending: count(STATUS_PENDING)?,
                    delivered: count(STATUS_DELIVERED)?,
                    dead: count(STATUS_DEAD)?,
                })
            }
        })
        .await?
    }
}

/// Inserts one job per target inside the caller's transaction, so a job only
/// exists if the state change that produced it was committed.
pub(crate) fn enqueue_tx(tx: &Transaction<'_>, activity_json: &[u8], targets: &[String]) -> Result<u64> {
    let created_at = now_ms();
    let activity_id = activity_id_from_bytes(activity_json);
    let mut n = 0;
    for t in targets {
        let t = t.trim();
        if t.is_empty() {
            continue;
        }
        tx.execute(
            r#"
            INSERT INTO delivery_jobs (
              id, created_at_ms, next_attempt_at_ms, attempt, status, target, activity_json, activity_id, last_error
            ) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, NULL)
            "#,
            params![new_id(), created_at, created_at, STATUS_PENDING, t, activity_json, activity_id],
        )
        .with_context(|| format!("enqueue delivery to {t}"))?;
        n += 1;
    }
    Ok(n)
}

fn short_body_hash(bytes: &[u8]) -> String {
    use sha2::Digest as _;
    let mut h = sha2::Sha256::new();
    h.update(bytes);
    hex::encode(&h.finalize()[..8])
}

pub(crate) fn init_db(path: &Path) -> Result<()> {
    let conn: Connection = connect(path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS delivery_jobs (
          id TEXT PRIMARY KEY,
          created_at_ms INTEGER NOT NULL,
          next_attempt_at_ms INTEGER NOT NULL,
          attempt INTEGER NOT NULL,
          status INTEGER NOT NULL,
          target TEXT NOT NULL,
          activity_json BLOB NOT NULL,
          activity_id TEXT NULL,
          last_error TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_delivery_due ON delivery_jobs(status, next_attempt_at_ms);
        "#,
    )?;
    Ok(())
}

fn next_backoff(attempt: u32, base_secs: u64, max_secs: u64) -> Duration {
    let pow = attempt.saturating_sub(1).min(20);
    let secs = base_secs.saturating_mul(1u64 << pow).min(max_secs);
    // jitter 0..1000ms
    let mut b = [0u8; 2];
    OsRng.fill_bytes(&mut b);
    let jitter_ms = u16::from_le_bytes(b) as u64 % 1000;
    Duration::from_secs(secs) + Duration::from_millis(jitter_ms)
}

pub(crate) fn activity_id_from_bytes(bytes: &[u8]) -> Option<String> {
    if let Ok(v) = serde_json::from_slice::<serde_json::Value>(bytes) {
        if let Some(id) = v.get("id").and_then(|v| v.as_str()) {
            let id = id.trim();
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    if bytes.is_empty() {
        return None;
    }
    use sha2::Digest as _;
    let mut h = sha2::Sha256::new();
    h.update(bytes);
    Some(format!("urn:fedigate:activity:sha256:{}", hex::encode(h.finalize())))
}
