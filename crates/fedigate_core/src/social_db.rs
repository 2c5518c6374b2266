/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::ids::now_ms;
use crate::model::{Account, Favourite, InteractionKind, Status, Visibility};
use crate::notifications::{Notification, NotificationKind};
use crate::policy::{InteractionPolicy, Relationships};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Accounts, statuses, favourites, follows, notifications, and the schema of
/// every table the core keeps in the same SQLite file.
#[derive(Clone)]
pub struct SocialDb {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CollectionPage<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
}

/// Position of the last item on a page. Pages are ordered by
/// `(created_at_ms, id)` descending, so rows sharing a millisecond are not skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at_ms: i64,
    pub id: String,
}

impl PageCursor {
    /// Bind values for `(created_at_ms < ?a OR (created_at_ms = ?a AND id < ?b))`.
    pub(crate) fn bounds(cursor: Option<&PageCursor>) -> (i64, String) {
        match cursor {
            Some(c) => (c.created_at_ms, c.id.clone()),
            None => (i64::MAX, String::new()),
        }
    }
}

impl<T> CollectionPage<T> {
    pub(crate) fn from_items(items: Vec<T>, limit: u32, key: impl Fn(&T) -> PageCursor) -> Self {
        let next = if items.len() as u32 == limit {
            items.last().map(key)
        } else {
            None
        };
        Self { items, next }
    }
}

pub(crate) fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).with_context(|| format!("open db: {}", path.display()))?;
    conn.busy_timeout(Duration::from_secs(10))?;
    Ok(conn)
}

impl SocialDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create data dir: {}", dir.display()))?;
        }
        let conn = connect(&path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS accounts (
              id TEXT PRIMARY KEY,
              username TEXT NOT NULL,
              domain TEXT NULL,
              uri TEXT NOT NULL UNIQUE,
              inbox_url TEXT NULL,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follows (
              follower_id TEXT NOT NULL,
              target_id TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(follower_id, target_id)
            );

            CREATE TABLE IF NOT EXISTS statuses (
              id TEXT PRIMARY KEY,
              uri TEXT NOT NULL UNIQUE,
              account_id TEXT NOT NULL,
              in_reply_to_id TEXT NULL,
              in_reply_to_account_id TEXT NULL,
              boost_of_id TEXT NULL,
              mentions_json TEXT NOT NULL DEFAULT '[]',
              visibility TEXT NOT NULL,
              pending_approval INTEGER NOT NULL DEFAULT 0,
              approved_by_uri TEXT NULL,
              rejected_by_uri TEXT NULL,
              policy_json TEXT NULL,
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_statuses_reply ON statuses(in_reply_to_id, created_at_ms DESC);
            CREATE INDEX IF NOT EXISTS idx_statuses_boost ON statuses(boost_of_id);

            CREATE TABLE IF NOT EXISTS favourites (
              id TEXT PRIMARY KEY,
              uri TEXT NOT NULL UNIQUE,
              account_id TEXT NOT NULL,
              status_id TEXT NOT NULL,
              pending_approval INTEGER NOT NULL DEFAULT 0,
              approved_by_uri TEXT NULL,
              rejected_by_uri TEXT NULL,
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_favourites_status ON favourites(status_id);

            CREATE TABLE IF NOT EXISTS interaction_requests (
              id TEXT PRIMARY KEY,
              interaction_uri TEXT NOT NULL UNIQUE,
              kind TEXT NOT NULL,
              status_id TEXT NOT NULL,
              account_id TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL,
              state INTEGER NOT NULL,
              decided_at_ms INTEGER NULL,
              decision_uri TEXT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_int_req_status ON interaction_requests(status_id, created_at_ms DESC);
            CREATE INDEX IF NOT EXISTS idx_int_req_state ON interaction_requests(state, created_at_ms DESC);

            CREATE TABLE IF NOT EXISTS polls (
              id TEXT PRIMARY KEY,
              status_id TEXT NOT NULL UNIQUE,
              options_json TEXT NOT NULL,
              multiple INTEGER NOT NULL,
              expires_at_ms INTEGER NULL,
              voters_count INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS poll_option_counts (
              poll_id TEXT NOT NULL,
              option_index INTEGER NOT NULL,
              votes INTEGER NOT NULL DEFAULT 0,
              PRIMARY KEY(poll_id, option_index)
            );

            CREATE TABLE IF NOT EXISTS poll_votes (
              id TEXT PRIMARY KEY,
              poll_id TEXT NOT NULL,
              account_id TEXT NOT NULL,
              choices_json TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL,
              UNIQUE(poll_id, account_id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
              id TEXT PRIMARY KEY,
              kind TEXT NOT NULL,
              target_account_id TEXT NOT NULL,
              origin_account_id TEXT NOT NULL,
              status_id TEXT NULL,
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_target ON notifications(target_account_id, created_at_ms DESC);

            CREATE TABLE IF NOT EXISTS domain_permissions (
              domain TEXT NOT NULL,
              permission TEXT NOT NULL,
              created_by_account_id TEXT NULL,
              private_comment TEXT NULL,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(domain, permission)
            );

            CREATE TABLE IF NOT EXISTS domain_permission_drafts (
              id TEXT PRIMARY KEY,
              domain TEXT NOT NULL,
              permission TEXT NOT NULL,
              created_by_account_id TEXT NOT NULL,
              private_comment TEXT NULL,
              created_at_ms INTEGER NOT NULL,
              UNIQUE(domain, permission)
            );

            CREATE TABLE IF NOT EXISTS domain_permission_ignores (
              domain TEXT NOT NULL,
              permission TEXT NOT NULL,
              created_by_account_id TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(domain, permission)
            );
            "#,
        )?;
        ensure_columns(&conn, "accounts", &[("admin", "INTEGER NOT NULL DEFAULT 0")])?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = connect(&self.path)?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn put_account(&self, account: &Account) -> Result<()> {
        let conn = connect(&self.path)?;
        conn.execute(
            r#"
            INSERT INTO accounts(id, username, domain, uri, inbox_url, created_at_ms, admin)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
              username=excluded.username,
              domain=excluded.domain,
              uri=excluded.uri,
              inbox_url=excluded.inbox_url,
              admin=excluded.admin
            "#,
            params![
                account.id,
                account.username,
                account.domain.as_deref().map(|d| d.to_ascii_lowercase()),
                account.uri,
                account.inbox_url,
                account.created_at_ms,
                account.admin as i64
            ],
        )
        .with_context(|| format!("put account {}", account.id))?;
        Ok(())
    }

    pub fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let conn = connect(&self.path)?;
        conn.query_row(
            "SELECT id, username, domain, uri, inbox_url, created_at_ms, admin FROM accounts WHERE id=?1",
            params![id],
            account_from_row,
        )
        .optional()
        .with_context(|| format!("get account {id}"))
    }

    pub fn get_account_by_uri(&self, uri: &str) -> Result<Option<Account>> {
        let conn = connect(&self.path)?;
        conn.query_row(
            "SELECT id, username, domain, uri, inbox_url, created_at_ms, admin FROM accounts WHERE uri=?1",
            params![uri],
            account_from_row,
        )
        .optional()
        .with_context(|| format!("get account by uri {uri}"))
    }

    pub fn add_follow(&self, follower_id: &str, target_id: &str) -> Result<()> {
        let conn = connect(&self.path)?;
        conn.execute(
            "INSERT OR IGNORE INTO follows(follower_id, target_id, created_at_ms) VALUES (?1, ?2, ?3)",
            params![follower_id, target_id, now_ms()],
        )?;
        Ok(())
    }

    pub fn remove_follow(&self, follower_id: &str, target_id: &str) -> Result<()> {
        let conn = connect(&self.path)?;
        conn.execute(
            "DELETE FROM follows WHERE follower_id=?1 AND target_id=?2",
            params![follower_id, target_id],
        )?;
        Ok(())
    }

    pub fn is_following(&self, follower_id: &str, target_id: &str) -> Result<bool> {
        let conn = connect(&self.path)?;
        let v: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM follows WHERE follower_id=?1 AND target_id=?2",
                params![follower_id, target_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v.is_some())
    }

    /// Inserts or overwrites the mutable columns of an existing status.
    pub fn put_status(&self, status: &Status) -> Result<()> {
        let conn = connect(&self.path)?;
        write_status(&conn, status, STATUS_UPSERT)
            .with_context(|| format!("put status {}", status.id))
    }

    pub fn get_status(&self, id: &str) -> Result<Option<Status>> {
        let conn = connect(&self.path)?;
        get_status_where(&conn, "id", id).with_context(|| format!("get status {id}"))
    }

    pub fn get_status_by_uri(&self, uri: &str) -> Result<Option<Status>> {
        let conn = connect(&self.path)?;
        get_status_where(&conn, "uri", uri).with_context(|| format!("get status by uri {uri}"))
    }

    /// Replies to `status_id`, newest first, including pending and rejected ones.
    pub fn list_replies(
        &self,
        status_id: &str,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> Result<CollectionPage<Status>> {
        let limit = limit.clamp(1, 200);
        let conn = connect(&self.path)?;
        let (before_ms, before_id) = PageCursor::bounds(cursor);
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {STATUS_COLUMNS} FROM statuses
            WHERE in_reply_to_id=?1 AND (created_at_ms < ?2 OR (created_at_ms = ?2 AND id < ?3))
            ORDER BY created_at_ms DESC, id DESC
            LIMIT ?4
            "#
        ))?;
        let items = stmt
            .query_map(
                params![status_id, before_ms, before_id, limit as i64],
                status_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(CollectionPage::from_items(items, limit, |s| PageCursor {
            created_at_ms: s.created_at_ms,
            id: s.id.clone(),
        }))
    }

    /// Deletes a status together with its poll, the poll's votes and counts.
    /// Returns false if there was nothing to delete.
    pub fn delete_status(&self, id: &str) -> Result<bool> {
        let mut conn = connect(&self.path)?;
        let tx = conn.transaction()?;
        let poll_id: Option<String> = tx
            .query_row(
                "SELECT id FROM polls WHERE status_id=?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(poll_id) = poll_id {
            delete_poll_tx(&tx, &poll_id)?;
        }
        tx.execute("DELETE FROM favourites WHERE status_id=?1", params![id])?;
        let n = tx.execute("DELETE FROM statuses WHERE id=?1", params![id])?;
        tx.commit().with_context(|| format!("delete status {id}"))?;
        Ok(n > 0)
    }

    pub fn put_favourite(&self, fave: &Favourite) -> Result<()> {
        let conn = connect(&self.path)?;
        write_favourite(&conn, fave, FAVOURITE_UPSERT)
            .with_context(|| format!("put favourite {}", fave.id))
    }

    pub fn get_favourite_by_uri(&self, uri: &str) -> Result<Option<Favourite>> {
        let conn = connect(&self.path)?;
        favourite_by_uri(&conn, uri).with_context(|| format!("get favourite by uri {uri}"))
    }

    pub fn insert_notification(&self, n: &Notification) -> Result<()> {
        let conn = connect(&self.path)?;
        conn.execute(
            "INSERT OR IGNORE INTO notifications(id, kind, target_account_id, origin_account_id, status_id, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                n.id,
                n.kind.as_str(),
                n.target_account_id,
                n.origin_account_id,
                n.status_id,
                n.created_at_ms
            ],
        )
        .with_context(|| format!("insert notification {} for {}", n.kind.as_str(), n.target_account_id))?;
        Ok(())
    }

    pub fn get_notification(
        &self,
        kind: NotificationKind,
        target_account_id: &str,
        origin_account_id: &str,
        status_id: Option<&str>,
    ) -> Result<Option<Notification>> {
        let conn = connect(&self.path)?;
        conn.query_row(
            r#"
            SELECT id, kind, target_account_id, origin_account_id, status_id, created_at_ms
            FROM notifications
            WHERE kind=?1 AND target_account_id=?2 AND origin_account_id=?3 AND status_id IS ?4
            ORDER BY created_at_ms DESC
            LIMIT 1
            "#,
            params![kind.as_str(), target_account_id, origin_account_id, status_id],
            notification_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_notifications(
        &self,
        target_account_id: &str,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> Result<CollectionPage<Notification>> {
        let limit = limit.clamp(1, 200);
        let conn = connect(&self.path)?;
        let (before_ms, before_id) = PageCursor::bounds(cursor);
        let mut stmt = conn.prepare(
            r#"
            SELECT id, kind, target_account_id, origin_account_id, status_id, created_at_ms
            FROM notifications
            WHERE target_account_id=?1 AND (created_at_ms < ?2 OR (created_at_ms = ?2 AND id < ?3))
            ORDER BY created_at_ms DESC, id DESC
            LIMIT ?4
            "#,
        )?;
        let items = stmt
            .query_map(
                params![target_account_id, before_ms, before_id, limit as i64],
                notification_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(CollectionPage::from_items(items, limit, |n| PageCursor {
            created_at_ms: n.created_at_ms,
            id: n.id.clone(),
        }))
    }
}

impl Relationships for SocialDb {
    fn follows(&self, follower_id: &str, target_id: &str) -> Result<bool> {
        self.is_following(follower_id, target_id)
    }
}

const STATUS_COLUMNS: &str = "id, uri, account_id, in_reply_to_id, in_reply_to_account_id, boost_of_id, mentions_json, visibility, pending_approval, approved_by_uri, rejected_by_uri, policy_json, created_at_ms";

const STATUS_UPSERT: &str = r#"
    ON CONFLICT(id) DO UPDATE SET
      mentions_json=excluded.mentions_json,
      visibility=excluded.visibility,
      pending_approval=excluded.pending_approval,
      approved_by_uri=excluded.approved_by_uri,
      rejected_by_uri=excluded.rejected_by_uri,
      policy_json=excluded.policy_json
"#;

const FAVOURITE_UPSERT: &str = r#"
    ON CONFLICT(id) DO UPDATE SET
      pending_approval=excluded.pending_approval,
      approved_by_uri=excluded.approved_by_uri,
      rejected_by_uri=excluded.rejected_by_uri
"#;

/// Plain insert; an existing id or uri is a constraint violation.
pub(crate) fn insert_status(conn: &Connection, status: &Status) -> Result<()> {
    write_status(conn, status, "")
}

pub(crate) fn insert_favourite(conn: &Connection, fave: &Favourite) -> Result<()> {
    write_favourite(conn, fave, "")
}

fn write_status(conn: &Connection, status: &Status, on_conflict: &str) -> Result<()> {
    let mentions = serde_json::to_string(&status.mentions)?;
    let policy = status
        .interaction_policy
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        &format!(
            r#"
            INSERT INTO statuses({STATUS_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            {on_conflict}
            "#
        ),
        params![
            status.id,
            status.uri,
            status.account_id,
            status.in_reply_to_id,
            status.in_reply_to_account_id,
            status.boost_of_id,
            mentions,
            status.visibility.as_str(),
            status.pending_approval as i64,
            status.approved_by_uri,
            status.rejected_by_uri,
            policy,
            status.created_at_ms
        ],
    )?;
    Ok(())
}

fn write_favourite(conn: &Connection, fave: &Favourite, on_conflict: &str) -> Result<()> {
    conn.execute(
        &format!(
            r#"
            INSERT INTO favourites(id, uri, account_id, status_id, pending_approval, approved_by_uri, rejected_by_uri, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            {on_conflict}
            "#
        ),
        params![
            fave.id,
            fave.uri,
            fave.account_id,
            fave.status_id,
            fave.pending_approval as i64,
            fave.approved_by_uri,
            fave.rejected_by_uri,
            fave.created_at_ms
        ],
    )?;
    Ok(())
}

pub(crate) fn status_by_uri(conn: &Connection, uri: &str) -> Result<Option<Status>> {
    get_status_where(conn, "uri", uri)
}

pub(crate) fn favourite_by_uri(conn: &Connection, uri: &str) -> Result<Option<Favourite>> {
    conn.query_row(
        "SELECT id, uri, account_id, status_id, pending_approval, approved_by_uri, rejected_by_uri, created_at_ms FROM favourites WHERE uri=?1",
        params![uri],
        favourite_from_row,
    )
    .optional()
    .map_err(Into::into)
}

fn get_status_where(conn: &Connection, column: &str, value: &str) -> Result<Option<Status>> {
    conn.query_row(
        &format!("SELECT {STATUS_COLUMNS} FROM statuses WHERE {column}=?1"),
        params![value],
        status_from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Clears `pending_approval` on the interacting object and records the decision URI.
/// Reply and reblog live in `statuses`, favourites in `favourites`.
pub(crate) fn mark_interaction_decided(
    tx: &Transaction<'_>,
    kind: InteractionKind,
    interaction_uri: &str,
    decision_uri: &str,
    accepted: bool,
) -> Result<usize> {
    let table = match kind {
        InteractionKind::Reply | InteractionKind::Reblog => "statuses",
        InteractionKind::Favourite => "favourites",
    };
    let column = if accepted {
        "approved_by_uri"
    } else {
        "rejected_by_uri"
    };
    let n = tx.execute(
        &format!("UPDATE {table} SET pending_approval=0, {column}=?2 WHERE uri=?1"),
        params![interaction_uri, decision_uri],
    )?;
    Ok(n)
}

pub(crate) fn delete_poll_tx(tx: &Transaction<'_>, poll_id: &str) -> Result<usize> {
    tx.execute("DELETE FROM poll_votes WHERE poll_id=?1", params![poll_id])?;
    tx.execute(
        "DELETE FROM poll_option_counts WHERE poll_id=?1",
        params![poll_id],
    )?;
    let n = tx.execute("DELETE FROM polls WHERE id=?1", params![poll_id])?;
    Ok(n)
}

fn account_from_row(r: &Row<'_>) -> rusqlite::Result<Account> {
    let admin: i64 = r.get(6)?;
    Ok(Account {
        id: r.get(0)?,
        username: r.get(1)?,
        domain: r.get(2)?,
        uri: r.get(3)?,
        inbox_url: r.get(4)?,
        created_at_ms: r.get(5)?,
        admin: admin != 0,
    })
}

fn status_from_row(r: &Row<'_>) -> rusqlite::Result<Status> {
    let mentions_json: String = r.get(6)?;
    let visibility: String = r.get(7)?;
    let pending: i64 = r.get(8)?;
    let policy_json: Option<String> = r.get(11)?;
    let mentions: Vec<String> = serde_json::from_str(&mentions_json).map_err(|e| conversion_err(6, e))?;
    let interaction_policy: Option<InteractionPolicy> = policy_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| conversion_err(11, e))?;
    Ok(Status {
        id: r.get(0)?,
        uri: r.get(1)?,
        account_id: r.get(2)?,
        in_reply_to_id: r.get(3)?,
        in_reply_to_account_id: r.get(4)?,
        boost_of_id: r.get(5)?,
        mentions,
        visibility: Visibility::parse(&visibility)
            .ok_or_else(|| conversion_err(7, anyhow!("unknown visibility {visibility}")))?,
        pending_approval: pending != 0,
        approved_by_uri: r.get(9)?,
        rejected_by_uri: r.get(10)?,
        interaction_policy,
        created_at_ms: r.get(12)?,
    })
}

fn favourite_from_row(r: &Row<'_>) -> rusqlite::Result<Favourite> {
    let pending: i64 = r.get(4)?;
    Ok(Favourite {
        id: r.get(0)?,
        uri: r.get(1)?,
        account_id: r.get(2)?,
        status_id: r.get(3)?,
        pending_approval: pending != 0,
        approved_by_uri: r.get(5)?,
        rejected_by_uri: r.get(6)?,
        created_at_ms: r.get(7)?,
    })
}

fn notification_from_row(r: &Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = r.get(1)?;
    Ok(Notification {
        id: r.get(0)?,
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| conversion_err(1, anyhow!("unknown notification kind {kind}")))?,
        target_account_id: r.get(2)?,
        origin_account_id: r.get(3)?,
        status_id: r.get(4)?,
        created_at_ms: r.get(5)?,
    })
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub(crate) fn conversion_err(
    col: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, e.into())
}

fn ensure_columns(conn: &Connection, table: &str, cols: &[(&str, &str)]) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut existing = std::collections::HashSet::new();
    for r in rows {
        existing.insert(r?);
    }
    for (name, ty) in cols {
        if !existing.contains(*name) {
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {name} {ty}"), [])?;
        }
    }
    Ok(())
}
