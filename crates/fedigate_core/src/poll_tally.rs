/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{GateError, GateResult};
use crate::ids::{new_id, now_ms};
use crate::model::{Poll, PollVote};
use crate::social_db::{connect, conversion_err, delete_poll_tx, is_constraint_violation};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_POLL_OPTIONS: usize = 6;

/// Per-option totals as stored. `options[i]` is the count for option `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollCounts {
    pub options: Vec<u64>,
    pub voters: u64,
}

/// Polls, their votes and the running counts. Every vote is one immediate
/// transaction: the vote row is unique per (poll, account) and counts are
/// bumped in place, so concurrent voters never lose an increment.
#[derive(Clone)]
pub struct PollTally {
    db_path: PathBuf,
    max_options: usize,
}

impl PollTally {
    /// Uses the tables created by [`crate::social_db::SocialDb::open`].
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            max_options: DEFAULT_MAX_POLL_OPTIONS,
        }
    }

    pub fn with_max_options(mut self, max_options: usize) -> Self {
        self.max_options = max_options.max(2);
        self
    }

    pub fn put_poll(&self, poll: &Poll) -> GateResult<()> {
        if poll.options.len() < 2 || poll.options.len() > self.max_options {
            return Err(GateError::invalid(format!(
                "poll must have between 2 and {} options, got {}",
                self.max_options,
                poll.options.len()
            )));
        }
        if poll.options.iter().any(|o| o.trim().is_empty()) {
            return Err(GateError::invalid("poll option must not be empty"));
        }

        let mut conn = connect(&self.db_path)?;
        let tx = conn.transaction().context("begin put poll")?;
        let res = tx.execute(
            r#"
            INSERT INTO polls(id, status_id, options_json, multiple, expires_at_ms, voters_count, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
            params![
                poll.id,
                poll.status_id,
                serde_json::to_string(&poll.options).context("encode poll options")?,
                poll.multiple as i64,
                poll.expires_at_ms,
                poll.created_at_ms
            ],
        );
        match res {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(GateError::conflict(format!(
                    "poll {} or a poll on status {} already exists",
                    poll.id, poll.status_id
                )))
            }
            Err(e) => return Err(anyhow::Error::new(e).context(format!("put poll {}", poll.id)).into()),
        }
        for i in 0..poll.options.len() {
            tx.execute(
                "INSERT INTO poll_option_counts(poll_id, option_index, votes) VALUES (?1, ?2, 0)",
                params![poll.id, i as i64],
            )?;
        }
        tx.commit().with_context(|| format!("commit poll {}", poll.id))?;
        Ok(())
    }

    pub fn get_poll(&self, poll_id: &str) -> GateResult<Poll> {
        let conn = connect(&self.db_path)?;
        get_poll_where(&conn, "id", poll_id)
            .with_context(|| format!("get poll {poll_id}"))?
            .ok_or_else(|| GateError::not_found(format!("poll {poll_id}")))
    }

    pub fn get_poll_by_status_id(&self, status_id: &str) -> GateResult<Poll> {
        let conn = connect(&self.db_path)?;
        get_poll_where(&conn, "status_id", status_id)
            .with_context(|| format!("get poll for status {status_id}"))?
            .ok_or_else(|| GateError::not_found(format!("poll on status {status_id}")))
    }

    /// Removes the poll with its votes and counts.
    pub fn delete_poll(&self, poll_id: &str) -> Result<bool> {
        let mut conn = connect(&self.db_path)?;
        let tx = conn.transaction()?;
        let n = delete_poll_tx(&tx, poll_id)?;
        tx.commit().with_context(|| format!("delete poll {poll_id}"))?;
        Ok(n > 0)
    }

    pub fn register_vote(
        &self,
        poll_id: &str,
        account_id: &str,
        choices: &[usize],
    ) -> GateResult<PollVote> {
        let mut conn = connect(&self.db_path)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin vote transaction")?;

        let poll = get_poll_where(&tx, "id", poll_id)
            .with_context(|| format!("get poll {poll_id}"))?
            .ok_or_else(|| GateError::not_found(format!("poll {poll_id}")))?;
        let now = now_ms();
        validate_choices(&poll, choices, now)?;

        let vote = PollVote {
            id: new_id(),
            poll_id: poll.id.clone(),
            account_id: account_id.to_string(),
            choices: choices.to_vec(),
            created_at_ms: now,
        };
        let res = tx.execute(
            "INSERT INTO poll_votes(id, poll_id, account_id, choices_json, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                vote.id,
                vote.poll_id,
                vote.account_id,
                serde_json::to_string(&vote.choices).context("encode choices")?,
                vote.created_at_ms
            ],
        );
        match res {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(GateError::conflict(format!(
                    "account {account_id} already voted in poll {poll_id}"
                )))
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("insert vote on poll {poll_id}"))
                    .into())
            }
        }

        for idx in choices {
            let n = tx.execute(
                "UPDATE poll_option_counts SET votes = votes + 1 WHERE poll_id = ?1 AND option_index = ?2",
                params![poll.id, *idx as i64],
            )?;
            if n != 1 {
                return Err(anyhow::anyhow!("poll {} has no count row for option {idx}", poll.id).into());
            }
        }
        tx.execute(
            "UPDATE polls SET voters_count = voters_count + 1 WHERE id = ?1",
            params![poll.id],
        )?;
        tx.commit()
            .with_context(|| format!("commit vote on poll {poll_id}"))?;
        Ok(vote)
    }

    pub fn count_votes(&self, poll_id: &str) -> GateResult<PollCounts> {
        let mut conn = connect(&self.db_path)?;
        // One read transaction so the counts and voter total agree.
        let tx = conn.transaction()?;
        let voters: Option<i64> = tx
            .query_row(
                "SELECT voters_count FROM polls WHERE id = ?1",
                params![poll_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(voters) = voters else {
            return Err(GateError::not_found(format!("poll {poll_id}")));
        };
        let options = {
            let mut stmt = tx.prepare(
                "SELECT votes FROM poll_option_counts WHERE poll_id = ?1 ORDER BY option_index ASC",
            )?;
            let rows = stmt
                .query_map(params![poll_id], |r| r.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .with_context(|| format!("count votes on poll {poll_id}"))?;
            rows.into_iter().map(|v| v.max(0) as u64).collect()
        };
        tx.commit()?;
        Ok(PollCounts {
            options,
            voters: voters.max(0) as u64,
        })
    }

    pub fn get_vote_by(&self, poll_id: &str, account_id: &str) -> GateResult<PollVote> {
        let conn = connect(&self.db_path)?;
        conn.query_row(
            "SELECT id, poll_id, account_id, choices_json, created_at_ms FROM poll_votes WHERE poll_id = ?1 AND account_id = ?2",
            params![poll_id, account_id],
            vote_from_row,
        )
        .optional()
        .with_context(|| format!("get vote by {account_id} on poll {poll_id}"))?
        .ok_or_else(|| GateError::not_found(format!("vote by {account_id} on poll {poll_id}")))
    }

    /// All votes on a poll keyed by voting account.
    pub fn get_poll_votes(&self, poll_id: &str) -> Result<BTreeMap<String, PollVote>> {
        let conn = connect(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT id, poll_id, account_id, choices_json, created_at_ms FROM poll_votes WHERE poll_id = ?1",
        )?;
        let votes = stmt
            .query_map(params![poll_id], vote_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("list votes on poll {poll_id}"))?;
        Ok(votes
            .into_iter()
            .map(|v| (v.account_id.clone(), v))
            .collect())
    }
}

/// Checks a ballot against the poll before anything is written.
pub(crate) fn validate_choices(poll: &Poll, choices: &[usize], now_ms: i64) -> GateResult<()> {
    if poll.is_expired_at(now_ms) {
        return Err(GateError::invalid(format!("poll {} has expired", poll.id)));
    }
    if choices.is_empty() {
        return Err(GateError::invalid("no choices given"));
    }
    if !poll.multiple && choices.len() > 1 {
        return Err(GateError::invalid(format!(
            "poll {} accepts a single choice",
            poll.id
        )));
    }
    let mut seen = BTreeSet::new();
    for idx in choices {
        if *idx >= poll.options.len() {
            return Err(GateError::invalid(format!(
                "choice {idx} out of range for poll {} with {} options",
                poll.id,
                poll.options.len()
            )));
        }
        if !seen.insert(*idx) {
            return Err(GateError::invalid(format!("choice {idx} given twice")));
        }
    }
    Ok(())
}

fn get_poll_where(conn: &Connection, column: &str, value: &str) -> Result<Option<Poll>> {
    conn.query_row(
        &format!(
            "SELECT id, status_id, options_json, multiple, expires_at_ms, created_at_ms FROM polls WHERE {column} = ?1"
        ),
        params![value],
        poll_from_row,
    )
    .optional()
    .map_err(Into::into)
}

fn poll_from_row(r: &Row<'_>) -> rusqlite::Result<Poll> {
    let options_json: String = r.get(2)?;
    let multiple: i64 = r.get(3)?;
    Ok(Poll {
        id: r.get(0)?,
        status_id: r.get(1)?,
        options: serde_json::from_str(&options_json).map_err(|e| conversion_err(2, e))?,
        multiple: multiple != 0,
        expires_at_ms: r.get(4)?,
        created_at_ms: r.get(5)?,
    })
}

fn vote_from_row(r: &Row<'_>) -> rusqlite::Result<PollVote> {
    let choices_json: String = r.get(3)?;
    Ok(PollVote {
        id: r.get(0)?,
        poll_id: r.get(1)?,
        account_id: r.get(2)?,
        choices: serde_json::from_str(&choices_json).map_err(|e| conversion_err(3, e))?,
        created_at_ms: r.get(4)?,
    })
}
