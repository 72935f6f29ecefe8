//! Database migration runner.
//!
//! Every [`Migration`] names its own `revision` and the `down_revision` it
//! builds on.  Following those links from the single root yields a linear
//! history.  The revision currently applied is kept in a one-row
//! `schema_revision` table; no row means nothing has been applied yet.
//!
//! Each step runs inside its own transaction together with the update of
//! `schema_revision`, so a failing step leaves both the schema and the
//! recorded revision untouched.

pub mod v001_init_schema_orders;

use std::collections::HashSet;
use std::fmt;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::schema::Table;

/// Forward or backward step of a migration.
pub type StepFn = fn(&Connection) -> rusqlite::Result<()>;

/// Name of the table that records the applied revision.
pub const REVISION_TABLE: &str = "schema_revision";

/// Registered migrations.  Order here is irrelevant; the chain is rebuilt
/// from the revision links.
pub const MIGRATIONS: &[Migration] = &[v001_init_schema_orders::MIGRATION];

/// A single reversible schema change.
#[derive(Clone, Copy)]
pub struct Migration {
    pub revision: &'static str,
    /// `None` marks the root of the chain.
    pub down_revision: Option<&'static str>,
    pub description: &'static str,
    /// Tables created by `up` and dropped by `down`.
    pub tables: &'static [Table],
    pub up: StepFn,
    pub down: StepFn,
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("revision", &self.revision)
            .field("down_revision", &self.down_revision)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a [`Migration`], without its step functions.
#[derive(Debug, Serialize)]
pub struct RevisionInfo<'a> {
    pub revision: &'a str,
    pub down_revision: Option<&'a str>,
    pub description: &'a str,
    pub tables: &'a [Table],
}

impl<'a> From<&'a Migration> for RevisionInfo<'a> {
    fn from(m: &'a Migration) -> Self {
        Self {
            revision: m.revision,
            down_revision: m.down_revision,
            description: m.description,
            tables: m.tables,
        }
    }
}

// ---------------------------------------------------------------------------
// Migrator
// ---------------------------------------------------------------------------

/// Applies and reverts a registry of migrations against a connection.
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'a> {
    migrations: &'a [Migration],
}

impl Default for Migrator<'static> {
    fn default() -> Self {
        Self::new(MIGRATIONS)
    }
}

impl<'a> Migrator<'a> {
    pub fn new(migrations: &'a [Migration]) -> Self {
        Self { migrations }
    }

    /// The registry ordered from root to head.
    ///
    /// Rejects registries without exactly one root, with duplicate or
    /// dangling revisions, with branches, or with revisions unreachable from
    /// the root (which is how a cycle shows up).
    pub fn history(&self) -> Result<Vec<&'a Migration>> {
        if self.migrations.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        for m in self.migrations {
            if !seen.insert(m.revision) {
                return Err(StoreError::Migration(format!(
                    "duplicate revision {}",
                    m.revision
                )));
            }
        }

        for m in self.migrations {
            if let Some(parent) = m.down_revision {
                if !seen.contains(parent) {
                    return Err(StoreError::Migration(format!(
                        "revision {} builds on unknown revision {parent}",
                        m.revision
                    )));
                }
            }
        }

        let roots: Vec<_> = self
            .migrations
            .iter()
            .filter(|m| m.down_revision.is_none())
            .collect();
        let mut current = match roots.as_slice() {
            [root] => *root,
            [] => return Err(StoreError::Migration("no root revision".to_string())),
            many => {
                let names: Vec<_> = many.iter().map(|m| m.revision).collect();
                return Err(StoreError::Migration(format!(
                    "multiple root revisions: {}",
                    names.join(", ")
                )));
            }
        };

        let mut chain = vec![current];
        loop {
            let children: Vec<_> = self
                .migrations
                .iter()
                .filter(|m| m.down_revision == Some(current.revision))
                .collect();
            match children.as_slice() {
                [] => break,
                [child] => {
                    chain.push(*child);
                    current = *child;
                }
                many => {
                    let names: Vec<_> = many.iter().map(|m| m.revision).collect();
                    return Err(StoreError::Migration(format!(
                        "revision {} has more than one child: {}",
                        current.revision,
                        names.join(", ")
                    )));
                }
            }
        }

        if chain.len() != self.migrations.len() {
            let reached: HashSet<_> = chain.iter().map(|m| m.revision).collect();
            let orphans: Vec<_> = self
                .migrations
                .iter()
                .map(|m| m.revision)
                .filter(|r| !reached.contains(r))
                .collect();
            return Err(StoreError::Migration(format!(
                "revisions not reachable from root: {}",
                orphans.join(", ")
            )));
        }

        Ok(chain)
    }

    /// Pretty JSON of the chain, root first, with the tables each revision owns.
    pub fn describe(&self) -> Result<String> {
        let revisions: Vec<RevisionInfo<'_>> = self
            .history()?
            .into_iter()
            .map(RevisionInfo::from)
            .collect();
        Ok(serde_json::to_string_pretty(&revisions)?)
    }

    /// Latest revision, or `None` for an empty registry.
    pub fn head(&self) -> Result<Option<&'static str>> {
        Ok(self.history()?.last().map(|m| m.revision))
    }

    /// Apply every pending migration up to and including `target`
    /// (`None` = head).  Returns the revisions applied, in order.
    pub fn upgrade(
        &self,
        conn: &mut Connection,
        target: Option<&str>,
    ) -> Result<Vec<&'static str>> {
        let chain = self.history()?;
        let current = current_revision(conn)?;
        let start = match current.as_deref() {
            Some(rev) => position(&chain, rev)? + 1,
            None => 0,
        };
        let end = match target {
            Some(rev) => position(&chain, rev)? + 1,
            None => chain.len(),
        };

        let head = chain.last().map(|m| m.revision);
        tracing::info!(
            current_revision = current.as_deref().unwrap_or("base"),
            target_revision = target.or(head).unwrap_or("base"),
            "checking database migrations"
        );

        if end < start {
            return Err(StoreError::Migration(format!(
                "target {} is behind current revision {}; downgrade instead",
                target.unwrap_or("head"),
                current.as_deref().unwrap_or("base")
            )));
        }

        let mut applied = Vec::new();
        for m in &chain[start..end] {
            tracing::info!(
                revision = m.revision,
                description = m.description,
                "applying migration"
            );
            let tx = conn.transaction()?;
            ensure_revision_table(&tx)?;
            (m.up)(&tx).map_err(|source| StoreError::Step {
                revision: m.revision,
                direction: "upgrade",
                source,
            })?;
            set_revision(&tx, Some(m.revision))?;
            tx.commit()?;
            applied.push(m.revision);
        }
        Ok(applied)
    }

    /// Revert applied migrations until `target` is the current revision
    /// (`None` = base, i.e. revert everything).  Returns the revisions
    /// reverted, newest first.
    pub fn downgrade(
        &self,
        conn: &mut Connection,
        target: Option<&str>,
    ) -> Result<Vec<&'static str>> {
        let chain = self.history()?;
        let Some(current) = current_revision(conn)? else {
            tracing::info!("database is at base, nothing to revert");
            return Ok(Vec::new());
        };

        let current_idx = position(&chain, &current)?;
        let stop = match target {
            Some(rev) => position(&chain, rev)? + 1,
            None => 0,
        };
        if stop > current_idx + 1 {
            return Err(StoreError::Migration(format!(
                "target {} is ahead of current revision {current}; upgrade instead",
                target.unwrap_or("base")
            )));
        }

        let mut reverted = Vec::new();
        for m in chain[stop..current_idx + 1].iter().rev() {
            tracing::info!(revision = m.revision, "reverting migration");
            let tx = conn.transaction()?;
            (m.down)(&tx).map_err(|source| StoreError::Step {
                revision: m.revision,
                direction: "downgrade",
                source,
            })?;
            set_revision(&tx, m.down_revision)?;
            tx.commit()?;
            reverted.push(m.revision);
        }
        Ok(reverted)
    }

    /// Tables that should exist given the revision recorded in `conn`.
    pub fn expected_tables(&self, conn: &Connection) -> Result<Vec<Table>> {
        let chain = self.history()?;
        let Some(current) = current_revision(conn)? else {
            return Ok(Vec::new());
        };
        let current_idx = position(&chain, &current)?;
        Ok(chain[..current_idx + 1]
            .iter()
            .flat_map(|m| m.tables.iter().copied())
            .collect())
    }
}

/// Upgrade to head using the built-in registry.
pub fn run_migrations(conn: &mut Connection) -> Result<Vec<&'static str>> {
    Migrator::default().upgrade(conn, None)
}

// ---------------------------------------------------------------------------
// Revision bookkeeping
// ---------------------------------------------------------------------------

fn position(chain: &[&Migration], revision: &str) -> Result<usize> {
    chain
        .iter()
        .position(|m| m.revision == revision)
        .ok_or_else(|| StoreError::UnknownRevision(revision.to_string()))
}

fn ensure_revision_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {REVISION_TABLE} (
            version_num TEXT PRIMARY KEY NOT NULL,
            applied_at  TEXT NOT NULL                -- RFC-3339
        );"
    ))?;
    Ok(())
}

/// Revision recorded in the database, `None` when nothing is applied.
pub fn current_revision(conn: &Connection) -> Result<Option<String>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [REVISION_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    let revision = conn
        .query_row(
            &format!("SELECT version_num FROM {REVISION_TABLE} LIMIT 1"),
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(revision)
}

fn set_revision(conn: &Connection, revision: Option<&str>) -> Result<()> {
    conn.execute(&format!("DELETE FROM {REVISION_TABLE}"), [])?;
    if let Some(revision) = revision {
        conn.execute(
            &format!("INSERT INTO {REVISION_TABLE} (version_num, applied_at) VALUES (?1, ?2)"),
            rusqlite::params![revision, chrono::Utc::now().to_rfc3339()],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect;
    use v001_init_schema_orders::REVISION;

    fn connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    fn notes_up(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE order_notes (
                id       INTEGER PRIMARY KEY,
                order_id INTEGER NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE
            );",
        )
    }

    fn notes_down(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("DROP TABLE order_notes;")
    }

    fn broken_up(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("CREATE TABLE half_done (id INTEGER); SELECT * FROM missing_table;")
    }

    const NOTES: Migration = Migration {
        revision: "add_order_notes",
        down_revision: Some(REVISION),
        description: "order notes",
        tables: &[],
        up: notes_up,
        down: notes_down,
    };

    const BROKEN: Migration = Migration {
        revision: "broken",
        down_revision: Some(REVISION),
        description: "fails halfway",
        tables: &[],
        up: broken_up,
        down: notes_down,
    };

    // Deliberately listed out of order.
    const TWO_STEP: &[Migration] = &[NOTES, v001_init_schema_orders::MIGRATION];

    fn revision_of(conn: &Connection) -> Option<String> {
        current_revision(conn).unwrap()
    }

    #[test]
    fn test_builtin_registry_is_rooted_at_init_schema() {
        let migrator = Migrator::default();
        let history = migrator.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].revision, "init_schema_orders");
        assert_eq!(history[0].down_revision, None);
        assert_eq!(migrator.head().unwrap(), Some("init_schema_orders"));
    }

    #[test]
    fn test_history_follows_links() {
        let revisions: Vec<_> = Migrator::new(TWO_STEP)
            .history()
            .unwrap()
            .iter()
            .map(|m| m.revision)
            .collect();
        assert_eq!(revisions, vec![REVISION, "add_order_notes"]);
    }

    #[test]
    fn test_history_rejects_broken_registries() {
        let branched = [v001_init_schema_orders::MIGRATION, NOTES, BROKEN];
        assert!(matches!(
            Migrator::new(&branched).history(),
            Err(StoreError::Migration(msg)) if msg.contains("more than one child")
        ));

        let rootless = [NOTES];
        assert!(Migrator::new(&rootless).history().is_err());

        let duplicated = [v001_init_schema_orders::MIGRATION, v001_init_schema_orders::MIGRATION];
        assert!(Migrator::new(&duplicated).history().is_err());

        let mut second_root = NOTES;
        second_root.down_revision = None;
        let two_roots = [v001_init_schema_orders::MIGRATION, second_root];
        assert!(matches!(
            Migrator::new(&two_roots).history(),
            Err(StoreError::Migration(msg)) if msg.contains("multiple root")
        ));

        let mut a = NOTES;
        a.revision = "a";
        a.down_revision = Some("b");
        let mut b = NOTES;
        b.revision = "b";
        b.down_revision = Some("a");
        let cyclic = [v001_init_schema_orders::MIGRATION, a, b];
        assert!(matches!(
            Migrator::new(&cyclic).history(),
            Err(StoreError::Migration(msg)) if msg.contains("not reachable")
        ));
    }

    #[test]
    fn test_describe_lists_tables() {
        let json = Migrator::default().describe().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["revision"], "init_schema_orders");
        assert!(value[0]["down_revision"].is_null());
        assert_eq!(value[0]["tables"][0]["name"], "users");
        assert_eq!(value[0]["tables"][2]["columns"][0]["name"], "id");
    }

    #[test]
    fn test_fresh_database_is_at_base() {
        let conn = connection();
        assert_eq!(revision_of(&conn), None);
    }

    #[test]
    fn test_upgrade_then_downgrade() {
        let mut conn = connection();
        let applied = run_migrations(&mut conn).unwrap();
        assert_eq!(applied, vec![REVISION]);
        assert_eq!(revision_of(&conn).as_deref(), Some(REVISION));
        assert_eq!(inspect::user_tables(&conn).unwrap().len(), 3);

        // Second run is a no-op.
        assert!(run_migrations(&mut conn).unwrap().is_empty());

        let reverted = Migrator::default().downgrade(&mut conn, None).unwrap();
        assert_eq!(reverted, vec![REVISION]);
        assert_eq!(revision_of(&conn), None);
        assert!(inspect::user_tables(&conn).unwrap().is_empty());

        // Already at base.
        assert!(Migrator::default().downgrade(&mut conn, None).unwrap().is_empty());
    }

    #[test]
    fn test_partial_upgrade_and_downgrade() {
        let mut conn = connection();
        let migrator = Migrator::new(TWO_STEP);

        assert_eq!(migrator.upgrade(&mut conn, Some(REVISION)).unwrap(), vec![REVISION]);
        assert_eq!(migrator.upgrade(&mut conn, None).unwrap(), vec!["add_order_notes"]);
        assert!(inspect::user_tables(&conn).unwrap().contains(&"order_notes".to_string()));

        assert!(matches!(
            migrator.upgrade(&mut conn, Some(REVISION)),
            Err(StoreError::Migration(_))
        ));

        assert_eq!(
            migrator.downgrade(&mut conn, Some(REVISION)).unwrap(),
            vec!["add_order_notes"]
        );
        assert_eq!(revision_of(&conn).as_deref(), Some(REVISION));
        assert_eq!(
            inspect::user_tables(&conn).unwrap(),
            vec!["order_items", "orders", "users"]
        );

        assert_eq!(migrator.downgrade(&mut conn, None).unwrap(), vec![REVISION]);
        assert_eq!(revision_of(&conn), None);
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let mut conn = connection();
        assert!(matches!(
            Migrator::default().upgrade(&mut conn, Some("nope")),
            Err(StoreError::UnknownRevision(rev)) if rev == "nope"
        ));
        assert_eq!(revision_of(&conn), None);

        // A rejected upgrade leaves the file untouched, bookkeeping included.
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_failed_step_rolls_back() {
        let mut conn = connection();
        let registry = [v001_init_schema_orders::MIGRATION, BROKEN];
        let migrator = Migrator::new(&registry);

        let err = migrator.upgrade(&mut conn, None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Step {
                revision: "broken",
                direction: "upgrade",
                ..
            }
        ));

        // The first step committed, the broken one left nothing behind.
        assert_eq!(revision_of(&conn).as_deref(), Some(REVISION));
        assert!(!inspect::user_tables(&conn)
            .unwrap()
            .contains(&"half_done".to_string()));
    }

    #[test]
    fn test_unregistered_revision_in_database() {
        let mut conn = connection();
        ensure_revision_table(&conn).unwrap();
        set_revision(&conn, Some("from_elsewhere")).unwrap();
        assert!(matches!(
            run_migrations(&mut conn),
            Err(StoreError::UnknownRevision(rev)) if rev == "from_elsewhere"
        ));
    }

    #[test]
    fn test_expected_tables_follow_revision() {
        let mut conn = connection();
        let migrator = Migrator::default();
        assert!(migrator.expected_tables(&conn).unwrap().is_empty());

        run_migrations(&mut conn).unwrap();
        let names: Vec<_> = migrator
            .expected_tables(&conn)
            .unwrap()
            .iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["users", "orders", "order_items"]);
    }
}
