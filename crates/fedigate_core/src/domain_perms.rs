/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{GateError, GateResult};
use crate::ids::{new_id, now_ms};
use crate::policy::{DomainPermission, DomainPermissions};
use crate::social_db::{connect, conversion_err, is_constraint_violation, SocialDb};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPermissionEntry {
    pub domain: String,
    pub permission: DomainPermission,
    pub created_by_account_id: Option<String>,
    pub private_comment: Option<String>,
    pub created_at_ms: i64,
}

/// A proposed block/silence/allow, waiting for an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPermissionDraft {
    pub id: String,
    pub domain: String,
    pub permission: DomainPermission,
    pub created_by_account_id: String,
    pub private_comment: Option<String>,
    pub created_at_ms: i64,
}

/// Per-domain moderation rules. A rule on `example.org` also covers every
/// subdomain; an explicit allow wins over a block or silence.
#[derive(Clone)]
pub struct DomainPermissionStore {
    db: SocialDb,
}

impl DomainPermissionStore {
    pub fn new(db: SocialDb) -> Self {
        Self { db }
    }

    pub fn put_permission(
        &self,
        domain: &str,
        permission: DomainPermission,
        created_by_account_id: Option<&str>,
        private_comment: Option<&str>,
    ) -> Result<DomainPermissionEntry> {
        let entry = DomainPermissionEntry {
            domain: normalize_domain(domain)?,
            permission,
            created_by_account_id: created_by_account_id.map(str::to_string),
            private_comment: private_comment.map(str::to_string),
            created_at_ms: now_ms(),
        };
        let conn = connect(self.db.path())?;
        conn.execute(
            r#"
            INSERT INTO domain_permissions(domain, permission, created_by_account_id, private_comment, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(domain, permission) DO UPDATE SET private_comment=excluded.private_comment
            "#,
            params![
                entry.domain,
                permission_str(permission),
                entry.created_by_account_id,
                entry.private_comment,
                entry.created_at_ms
            ],
        )
        .with_context(|| format!("put domain permission {} {}", permission_str(permission), entry.domain))?;
        Ok(entry)
    }

    pub fn remove_permission(&self, domain: &str, permission: DomainPermission) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        let conn = connect(self.db.path())?;
        let n = conn.execute(
            "DELETE FROM domain_permissions WHERE domain=?1 AND permission=?2",
            params![domain, permission_str(permission)],
        )?;
        Ok(n > 0)
    }

    pub fn list_permissions(&self) -> Result<Vec<DomainPermissionEntry>> {
        let conn = connect(self.db.path())?;
        let mut stmt = conn.prepare(
            "SELECT domain, permission, created_by_account_id, private_comment, created_at_ms FROM domain_permissions ORDER BY domain ASC",
        )?;
        let rows = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("list domain permissions")?;
        Ok(rows)
    }

    /// Returns `Ok(None)` when the draft comes from a subscription and the
    /// domain is on the ignore list for that permission.
    pub fn create_draft(
        &self,
        domain: &str,
        permission: DomainPermission,
        created_by_account_id: &str,
        private_comment: Option<&str>,
        from_subscription: bool,
    ) -> GateResult<Option<DomainPermissionDraft>> {
        let domain = normalize_domain(domain).map_err(|e| GateError::invalid(format!("{e}")))?;
        if from_subscription && self.is_ignored(&domain, permission)? {
            info!("draft {} {domain} skipped, domain ignored", permission_str(permission));
            return Ok(None);
        }
        let draft = DomainPermissionDraft {
            id: new_id(),
            domain,
            permission,
            created_by_account_id: created_by_account_id.to_string(),
            private_comment: private_comment.map(str::to_string),
            created_at_ms: now_ms(),
        };
        let conn = connect(self.db.path())?;
        let res = conn.execute(
            r#"
            INSERT INTO domain_permission_drafts(id, domain, permission, created_by_account_id, private_comment, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                draft.id,
                draft.domain,
                permission_str(permission),
                draft.created_by_account_id,
                draft.private_comment,
                draft.created_at_ms
            ],
        );
        match res {
            Ok(_) => Ok(Some(draft)),
            Err(e) if is_constraint_violation(&e) => Err(GateError::conflict(format!(
                "draft {} {} already exists",
                permission_str(permission),
                draft.domain
            ))),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("create draft for {}", draft.domain))
                .into()),
        }
    }

    pub fn get_draft(&self, id: &str) -> GateResult<DomainPermissionDraft> {
        let conn = connect(self.db.path())?;
        conn.query_row(
            "SELECT id, domain, permission, created_by_account_id, private_comment, created_at_ms FROM domain_permission_drafts WHERE id=?1",
            params![id],
            draft_from_row,
        )
        .optional()
        .with_context(|| format!("get domain permission draft {id}"))?
        .ok_or_else(|| GateError::not_found(format!("domain permission draft {id}")))
    }

    pub fn list_drafts(&self) -> Result<Vec<DomainPermissionDraft>> {
        let conn = connect(self.db.path())?;
        let mut stmt = conn.prepare(
            "SELECT id, domain, permission, created_by_account_id, private_comment, created_at_ms FROM domain_permission_drafts ORDER BY created_at_ms ASC",
        )?;
        let rows = stmt
            .query_map([], draft_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("list domain permission drafts")?;
        Ok(rows)
    }

    /// Turns a draft into an enforced permission and removes the draft.
    pub fn accept_draft(&self, draft_id: &str, admin_account_id: &str) -> GateResult<DomainPermissionEntry> {
        self.require_admin(admin_account_id)?;
        let draft = self.get_draft(draft_id)?;

        let mut conn = connect(self.db.path())?;
        let tx = conn.transaction().context("begin accept draft")?;
        let entry = DomainPermissionEntry {
            domain: draft.domain.clone(),
            permission: draft.permission,
            created_by_account_id: Some(admin_account_id.to_string()),
            private_comment: draft.private_comment.clone(),
            created_at_ms: now_ms(),
        };
        let res = tx.execute(
            r#"
            INSERT INTO domain_permissions(domain, permission, created_by_account_id, private_comment, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.domain,
                permission_str(entry.permission),
                entry.created_by_account_id,
                entry.private_comment,
                entry.created_at_ms
            ],
        );
        match res {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(GateError::conflict(format!(
                    "{} {} is already in force",
                    permission_str(entry.permission),
                    entry.domain
                )))
            }
            Err(e) => return Err(anyhow::Error::new(e).context("insert domain permission").into()),
        }
        tx.execute(
            "DELETE FROM domain_permission_drafts WHERE id=?1",
            params![draft.id],
        )?;
        tx.commit()
            .with_context(|| format!("commit accept draft {draft_id}"))?;
        info!(
            "domain permission {} {} accepted by {admin_account_id}",
            permission_str(entry.permission),
            entry.domain
        );
        Ok(entry)
    }

    pub fn reject_draft(&self, draft_id: &str, admin_account_id: &str) -> GateResult<()> {
        self.require_admin(admin_account_id)?;
        let conn = connect(self.db.path())?;
        let n = conn.execute(
            "DELETE FROM domain_permission_drafts WHERE id=?1",
            params![draft_id],
        )?;
        if n == 0 {
            return Err(GateError::not_found(format!("domain permission draft {draft_id}")));
        }
        Ok(())
    }

    pub fn add_ignore(&self, domain: &str, permission: DomainPermission, created_by_account_id: &str) -> Result<()> {
        let domain = normalize_domain(domain)?;
        let conn = connect(self.db.path())?;
        conn.execute(
            "INSERT OR IGNORE INTO domain_permission_ignores(domain, permission, created_by_account_id, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![domain, permission_str(permission), created_by_account_id, now_ms()],
        )?;
        Ok(())
    }

    pub fn remove_ignore(&self, domain: &str, permission: DomainPermission) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        let conn = connect(self.db.path())?;
        let n = conn.execute(
            "DELETE FROM domain_permission_ignores WHERE domain=?1 AND permission=?2",
            params![domain, permission_str(permission)],
        )?;
        Ok(n > 0)
    }

    pub fn is_ignored(&self, domain: &str, permission: DomainPermission) -> Result<bool> {
        let conn = connect(self.db.path())?;
        let mut stmt =
            conn.prepare("SELECT domain FROM domain_permission_ignores WHERE permission=?1")?;
        let patterns = stmt
            .query_map(params![permission_str(permission)], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns.iter().any(|p| domain_matches(domain, p)))
    }

    fn require_admin(&self, account_id: &str) -> GateResult<()> {
        let account = self
            .db
            .get_account(account_id)?
            .ok_or_else(|| GateError::not_found(format!("account {account_id}")))?;
        if !account.admin {
            return Err(GateError::forbidden(format!("account {account_id} is not an admin")));
        }
        Ok(())
    }
}

impl DomainPermissions for DomainPermissionStore {
    fn check(&self, domain: &str) -> Result<DomainPermission> {
        let entries = self.list_permissions()?;
        let matching = |perm: DomainPermission| {
            entries
                .iter()
                .any(|e| e.permission == perm && domain_matches(domain, &e.domain))
        };
        if matching(DomainPermission::Allowed) {
            return Ok(DomainPermission::Allowed);
        }
        if matching(DomainPermission::Blocked) {
            return Ok(DomainPermission::Blocked);
        }
        if matching(DomainPermission::Silenced) {
            return Ok(DomainPermission::Silenced);
        }
        Ok(DomainPermission::Allowed)
    }
}

/// `host` equals the pattern domain or is one of its subdomains.
/// Patterns may be written `example.org`, `.example.org` or `*.example.org`.
pub fn domain_matches(host: &str, pattern: &str) -> bool {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let p = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
    let p = p
        .strip_prefix("*.")
        .or_else(|| p.strip_prefix('.'))
        .unwrap_or(&p);
    if p.is_empty() {
        return false;
    }
    host == p || host.ends_with(&format!(".{p}"))
}

fn normalize_domain(domain: &str) -> Result<String> {
    let d = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    let d = d
        .strip_prefix("*.")
        .or_else(|| d.strip_prefix('.'))
        .unwrap_or(&d)
        .to_string();
    if d.is_empty() || d.contains('/') || d.contains(char::is_whitespace) {
        return Err(anyhow!("invalid domain: {domain:?}"));
    }
    Ok(d)
}

fn permission_str(p: DomainPermission) -> &'static str {
    match p {
        DomainPermission::Allowed => "allow",
        DomainPermission::Silenced => "silence",
        DomainPermission::Blocked => "block",
    }
}

fn permission_from_str(s: &str) -> Option<DomainPermission> {
    match s {
        "allow" => Some(DomainPermission::Allowed),
        "silence" => Some(DomainPermission::Silenced),
        "block" => Some(DomainPermission::Blocked),
        _ => None,
    }
}

fn parse_permission(r: &Row<'_>, col: usize) -> rusqlite::Result<DomainPermission> {
    let s: String = r.get(col)?;
    permission_from_str(&s).ok_or_else(|| conversion_err(col, anyhow!("unknown domain permission {s}")))
}

fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<DomainPermissionEntry> {
    Ok(DomainPermissionEntry {
        domain: r.get(0)?,
        permission: parse_permission(r, 1)?,
        created_by_account_id: r.get(2)?,
        private_comment: r.get(3)?,
        created_at_ms: r.get(4)?,
    })
}

fn draft_from_row(r: &Row<'_>) -> rusqlite::Result<DomainPermissionDraft> {
    Ok(DomainPermissionDraft {
        id: r.get(0)?,
        domain: r.get(1)?,
        permission: parse_permission(r, 2)?,
        created_by_account_id: r.get(3)?,
        private_comment: r.get(4)?,
        created_at_ms: r.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::social_db::tests::{create_test_db, local_account};

    #[test]
    fn matches_domain_and_subdomains() {
        assert!(domain_matches("example.org", "example.org"));
        assert!(domain_matches("social.example.org", "example.org"));
        assert!(domain_matches("a.b.example.org", "*.example.org"));
        assert!(domain_matches("Example.ORG.", ".example.org"));
        assert!(!domain_matches("badexample.org", "example.org"));
        assert!(!domain_matches("example.org", ""));
    }

    #[test]
    fn check_prefers_allow_then_block_then_silence() {
        let (db, _dir) = create_test_db();
        let store = DomainPermissionStore::new(db);
        store
            .put_permission("*.bad.example", DomainPermission::Blocked, None, Some("spam"))
            .unwrap();
        store
            .put_permission("good.bad.example", DomainPermission::Allowed, None, None)
            .unwrap();
        store
            .put_permission("loud.example", DomainPermission::Silenced, None, None)
            .unwrap();

        assert_eq!(store.check("bad.example").unwrap(), DomainPermission::Blocked);
        assert_eq!(store.check("x.bad.example").unwrap(), DomainPermission::Blocked);
        assert_eq!(store.check("good.bad.example").unwrap(), DomainPermission::Allowed);
        assert_eq!(store.check("loud.example").unwrap(), DomainPermission::Silenced);
        assert_eq!(store.check("fine.example").unwrap(), DomainPermission::Allowed);

        assert!(store.remove_permission("bad.example", DomainPermission::Blocked).unwrap());
        assert_eq!(store.check("x.bad.example").unwrap(), DomainPermission::Allowed);
        assert!(store.put_permission("  ", DomainPermission::Blocked, None, None).is_err());
    }

    #[test]
    fn drafts_need_an_admin_and_conflict_when_in_force() {
        let (db, _dir) = create_test_db();
        let moderator = local_account(&db, "mod");
        let mut admin = local_account(&db, "root");
        admin.admin = true;
        db.put_account(&admin).unwrap();
        let store = DomainPermissionStore::new(db);

        let draft = store
            .create_draft("spam.example", DomainPermission::Blocked, &moderator.id, None, false)
            .unwrap()
            .unwrap();
        let dup = store
            .create_draft("spam.example", DomainPermission::Blocked, &moderator.id, None, false)
            .unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::Conflict);

        let err = store.accept_draft(&draft.id, &moderator.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(store.check("spam.example").unwrap(), DomainPermission::Allowed);

        let entry = store.accept_draft(&draft.id, &admin.id).unwrap();
        assert_eq!(entry.permission, DomainPermission::Blocked);
        assert_eq!(store.check("spam.example").unwrap(), DomainPermission::Blocked);
        assert!(store.list_drafts().unwrap().is_empty());
        assert_eq!(
            store.accept_draft(&draft.id, &admin.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let again = store
            .create_draft("spam.example", DomainPermission::Blocked, &moderator.id, None, false)
            .unwrap()
            .unwrap();
        assert_eq!(
            store.accept_draft(&again.id, &admin.id).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        store.reject_draft(&again.id, &admin.id).unwrap();
        assert_eq!(
            store.get_draft(&again.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn ignored_domains_skip_subscription_drafts() {
        let (db, _dir) = create_test_db();
        let moderator = local_account(&db, "mod");
        let store = DomainPermissionStore::new(db);
        store
            .add_ignore("friends.example", DomainPermission::Blocked, &moderator.id)
            .unwrap();

        let skipped = store
            .create_draft("a.friends.example", DomainPermission::Blocked, &moderator.id, None, true)
            .unwrap();
        assert!(skipped.is_none());
        let manual = store
            .create_draft("a.friends.example", DomainPermission::Blocked, &moderator.id, None, false)
            .unwrap();
        assert!(manual.is_some());

        assert!(store.remove_ignore("friends.example", DomainPermission::Blocked).unwrap());
        assert!(!store.is_ignored("friends.example", DomainPermission::Blocked).unwrap());
    }
}
