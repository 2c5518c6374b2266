/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{GateError, GateResult};
use crate::ids::{new_id, now_ms};
use crate::model::{InteractionKind, InteractionRequest, RequestState};
use crate::social_db::{connect, conversion_err, is_constraint_violation, CollectionPage, PageCursor};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};

const REQUEST_COLUMNS: &str =
    "r.id, r.interaction_uri, r.kind, r.status_id, r.account_id, r.created_at_ms, r.state, r.decided_at_ms, r.decision_uri";

/// Gated interaction attempts. A record is created once per interaction URI
/// and only ever moves out of `Pending` through [`transition_tx`].
#[derive(Clone)]
pub struct InteractionRequestStore {
    db_path: PathBuf,
}

impl InteractionRequestStore {
    /// Uses the tables created by [`crate::social_db::SocialDb::open`].
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn create_request(
        &self,
        interaction_uri: &str,
        kind: InteractionKind,
        status_id: &str,
        account_id: &str,
    ) -> GateResult<InteractionRequest> {
        let conn = connect(&self.db_path)?;
        insert_request(&conn, interaction_uri, kind, status_id, account_id)
    }

    pub fn get_request(&self, id: &str) -> GateResult<InteractionRequest> {
        let conn = connect(&self.db_path)?;
        get_request_where(&conn, "id", id)
            .with_context(|| format!("get interaction request {id}"))?
            .ok_or_else(|| GateError::not_found(format!("interaction request {id}")))
    }

    pub fn get_request_by_uri(&self, interaction_uri: &str) -> GateResult<InteractionRequest> {
        let conn = connect(&self.db_path)?;
        get_request_where(&conn, "interaction_uri", interaction_uri)
            .with_context(|| format!("get interaction request by uri {interaction_uri}"))?
            .ok_or_else(|| {
                GateError::not_found(format!("interaction request for {interaction_uri}"))
            })
    }

    /// Pending requests on statuses owned by `owner_account_id`, newest first.
    pub fn list_pending_for_owner(
        &self,
        owner_account_id: &str,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> Result<CollectionPage<InteractionRequest>> {
        let limit = limit.clamp(1, 200);
        let conn = connect(&self.db_path)?;
        let (before_ms, before_id) = PageCursor::bounds(cursor);
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM interaction_requests r
            JOIN statuses s ON s.id = r.status_id
            WHERE s.account_id = ?1 AND r.state = ?2
              AND (r.created_at_ms < ?3 OR (r.created_at_ms = ?3 AND r.id < ?4))
            ORDER BY r.created_at_ms DESC, r.id DESC
            LIMIT ?5
            "#
        ))?;
        let items = stmt
            .query_map(
                params![
                    owner_account_id,
                    RequestState::Pending as i64,
                    before_ms,
                    before_id,
                    limit as i64
                ],
                request_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("list pending requests for {owner_account_id}"))?;
        Ok(CollectionPage::from_items(items, limit, |r| PageCursor {
            created_at_ms: r.created_at_ms,
            id: r.id.clone(),
        }))
    }

    /// Every request on a status, decided or not, oldest first.
    pub fn list_for_status(&self, status_id: &str) -> Result<Vec<InteractionRequest>> {
        let conn = connect(&self.db_path)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM interaction_requests r WHERE r.status_id = ?1 ORDER BY r.created_at_ms ASC"
        ))?;
        let items = stmt
            .query_map(params![status_id], request_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("list requests for status {status_id}"))?;
        Ok(items)
    }
}

pub(crate) fn insert_request(
    conn: &Connection,
    interaction_uri: &str,
    kind: InteractionKind,
    status_id: &str,
    account_id: &str,
) -> GateResult<InteractionRequest> {
    let req = InteractionRequest {
        id: new_id(),
        interaction_uri: interaction_uri.to_string(),
        kind,
        status_id: status_id.to_string(),
        account_id: account_id.to_string(),
        created_at_ms: now_ms(),
        state: RequestState::Pending,
        decided_at_ms: None,
        decision_uri: None,
    };
    let res = conn.execute(
        r#"
        INSERT INTO interaction_requests(id, interaction_uri, kind, status_id, account_id, created_at_ms, state)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            req.id,
            req.interaction_uri,
            req.kind.as_str(),
            req.status_id,
            req.account_id,
            req.created_at_ms,
            req.state as i64
        ],
    );
    match res {
        Ok(_) => Ok(req),
        Err(e) if is_constraint_violation(&e) => Err(GateError::conflict(format!(
            "interaction request already exists for {interaction_uri}"
        ))),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("create interaction request for {interaction_uri}"))
            .into()),
    }
}

pub(crate) fn get_request_tx(tx: &Transaction<'_>, id: &str) -> Result<Option<InteractionRequest>> {
    get_request_where(tx, "id", id)
}

pub(crate) fn find_request_by_uri(
    conn: &Connection,
    interaction_uri: &str,
) -> Result<Option<InteractionRequest>> {
    get_request_where(conn, "interaction_uri", interaction_uri)
}

/// Moves a request out of `Pending`. Returns false if another writer got there first.
pub(crate) fn transition_tx(
    tx: &Transaction<'_>,
    id: &str,
    to: RequestState,
    decision_uri: &str,
    decided_at_ms: i64,
) -> Result<bool> {
    let n = tx
        .execute(
            r#"
            UPDATE interaction_requests
            SET state = ?2, decision_uri = ?3, decided_at_ms = ?4
            WHERE id = ?1 AND state = ?5
            "#,
            params![
                id,
                to as i64,
                decision_uri,
                decided_at_ms,
                RequestState::Pending as i64
            ],
        )
        .with_context(|| format!("transition interaction request {id}"))?;
    Ok(n == 1)
}

fn get_request_where(
    conn: &Connection,
    column: &str,
    value: &str,
) -> Result<Option<InteractionRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM interaction_requests r WHERE r.{column} = ?1"),
        params![value],
        request_from_row,
    )
    .optional()
    .map_err(Into::into)
}

fn request_from_row(r: &Row<'_>) -> rusqlite::Result<InteractionRequest> {
    let kind: String = r.get(2)?;
    let state: i64 = r.get(6)?;
    Ok(InteractionRequest {
        id: r.get(0)?,
        interaction_uri: r.get(1)?,
        kind: InteractionKind::parse(&kind)
            .ok_or_else(|| conversion_err(2, anyhow!("unknown interaction kind {kind}")))?,
        status_id: r.get(3)?,
        account_id: r.get(4)?,
        created_at_ms: r.get(5)?,
        state: RequestState::from_i64(state)
            .ok_or_else(|| conversion_err(6, anyhow!("unknown request state {state}")))?,
        decided_at_ms: r.get(7)?,
        decision_uri: r.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::social_db::tests::{create_test_db, local_account, public_status, remote_account};

    #[test]
    fn duplicate_uri_is_conflict_and_first_is_untouched() {
        let (db, _dir) = create_test_db();
        let store = InteractionRequestStore::new(db.path());
        let first = store
            .create_request("https://remote.example/r/1", InteractionKind::Reply, "S1", "A1")
            .unwrap();
        assert_eq!(first.state, RequestState::Pending);

        let err = store
            .create_request("https://remote.example/r/1", InteractionKind::Favourite, "S2", "A2")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let again = store.get_request(&first.id).unwrap();
        assert_eq!(again, first);
        assert_eq!(
            store.get_request_by_uri("https://remote.example/r/1").unwrap(),
            first
        );
    }

    #[test]
    fn missing_request_is_not_found() {
        let (db, _dir) = create_test_db();
        let store = InteractionRequestStore::new(db.path());
        assert_eq!(store.get_request("nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            store.get_request_by_uri("https://x/1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn transitions_only_leave_pending_once() {
        let (db, _dir) = create_test_db();
        let store = InteractionRequestStore::new(db.path());
        let req = store
            .create_request("https://remote.example/r/2", InteractionKind::Reblog, "S1", "A1")
            .unwrap();

        let mut conn = connect(db.path()).unwrap();
        let tx = conn.transaction().unwrap();
        assert!(transition_tx(&tx, &req.id, RequestState::Accepted, "https://local.test/a/1", 5).unwrap());
        assert!(!transition_tx(&tx, &req.id, RequestState::Rejected, "https://local.test/r/1", 6).unwrap());
        tx.commit().unwrap();

        let got = store.get_request(&req.id).unwrap();
        assert_eq!(got.state, RequestState::Accepted);
        assert_eq!(got.decision_uri.as_deref(), Some("https://local.test/a/1"));
        assert_eq!(got.decided_at_ms, Some(5));
    }

    #[test]
    fn pending_listing_is_scoped_to_owner() {
        let (db, _dir) = create_test_db();
        let store = InteractionRequestStore::new(db.path());
        let alice = local_account(&db, "alice");
        let bob = local_account(&db, "bob");
        let carol = remote_account(&db, "carol", "remote.example");
        let a_status = public_status(&db, &alice);
        let b_status = public_status(&db, &bob);

        for i in 0..3 {
            store
                .create_request(
                    &format!("https://remote.example/r/a{i}"),
                    InteractionKind::Reply,
                    &a_status.id,
                    &carol.id,
                )
                .unwrap();
        }
        store
            .create_request("https://remote.example/r/b0", InteractionKind::Reply, &b_status.id, &carol.id)
            .unwrap();

        let all = store.list_pending_for_owner(&alice.id, 50, None).unwrap();
        assert_eq!(all.items.len(), 3);
        assert!(all.items.iter().all(|r| r.status_id == a_status.id));
        assert_eq!(all.next, None);
        assert_eq!(store.list_for_status(&b_status.id).unwrap().len(), 1);
    }

    #[test]
    fn pending_pages_do_not_skip_requests_created_in_the_same_millisecond() {
        let (db, _dir) = create_test_db();
        let store = InteractionRequestStore::new(db.path());
        let alice = local_account(&db, "alice");
        let carol = remote_account(&db, "carol", "remote.example");
        let status = public_status(&db, &alice);
        for i in 0..4 {
            store
                .create_request(
                    &format!("https://remote.example/r/same{i}"),
                    InteractionKind::Reply,
                    &status.id,
                    &carol.id,
                )
                .unwrap();
        }
        connect(db.path())
            .unwrap()
            .execute("UPDATE interaction_requests SET created_at_ms = 1000", [])
            .unwrap();

        let first = store.list_pending_for_owner(&alice.id, 2, None).unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next.clone().unwrap();
        assert_eq!(cursor.created_at_ms, 1000);

        let second = store
            .list_pending_for_owner(&alice.id, 2, Some(&cursor))
            .unwrap();
        assert_eq!(second.items.len(), 2);
        let third = store
            .list_pending_for_owner(&alice.id, 2, second.next.as_ref())
            .unwrap();
        assert!(third.items.is_empty());
        assert_eq!(third.next, None);

        let mut seen: Vec<String> = first
            .items
            .iter()
            .chain(second.items.iter())
            .map(|r| r.id.clone())
            .collect();
        seen.dedup();
        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0] > w[1]));
    }
}
