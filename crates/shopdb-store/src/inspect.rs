//! Read-only introspection of a live SQLite schema.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::migrations::REVISION_TABLE;
use crate::schema::Table;

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type exactly as written in `CREATE TABLE`.
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// One row of `PRAGMA foreign_key_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyInfo {
    /// Referenced table.
    pub table: String,
    pub from: String,
    pub to: String,
    pub on_delete: String,
}

/// Application tables, sorted by name.  SQLite internals and the revision
/// table are left out.
pub fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name <> ?1
         ORDER BY name ASC",
    )?;
    let rows = stmt.query_map(params![REVISION_TABLE], |row| row.get::<_, String>(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let rows = stmt.query_map(params![table], |row| {
        Ok(ColumnInfo {
            name: row.get(0)?,
            declared_type: row.get(1)?,
            not_null: row.get(2)?,
            default: row.get(3)?,
            primary_key: row.get::<_, i64>(4)? > 0,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

pub fn foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKeyInfo>> {
    let mut stmt = conn.prepare(
        "SELECT \"table\", \"from\", \"to\", on_delete
         FROM pragma_foreign_key_list(?1)
         ORDER BY id, seq",
    )?;
    let rows = stmt.query_map(params![table], |row| {
        Ok(ForeignKeyInfo {
            table: row.get(0)?,
            from: row.get(1)?,
            to: row.get(2)?,
            on_delete: row.get(3)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

/// Columns carrying a single-column `UNIQUE` constraint.  Primary keys and
/// explicitly created indexes are not counted.
pub fn unique_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT il.name, ii.name
         FROM pragma_index_list(?1) AS il
         JOIN pragma_index_info(il.name) AS ii
         WHERE il.\"unique\" = 1 AND il.origin = 'u'
         ORDER BY il.name, ii.seqno",
    )?;
    let rows = stmt.query_map(params![table], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let pairs = rows
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)?;

    let mut columns = Vec::new();
    for (index, column) in &pairs {
        let width = pairs.iter().filter(|(other, _)| other == index).count();
        if width == 1 {
            columns.push(column.clone());
        }
    }
    Ok(columns)
}

/// Whether `table` was declared with an `AUTOINCREMENT` key.
pub fn uses_autoincrement(conn: &Connection, table: &str) -> Result<bool> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(sql.is_some_and(|sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT")))
}

/// Check the live schema against `tables`.  Reports the first difference.
///
/// Declared types are compared ignoring case and whitespace, since SQLite
/// keeps the type text verbatim.
pub fn verify_schema(conn: &Connection, tables: &[Table]) -> Result<()> {
    let present = user_tables(conn)?;

    for table in tables {
        if !present.iter().any(|name| name == table.name) {
            return Err(mismatch(format!("table {} is missing", table.name)));
        }

        let live = table_columns(conn, table.name)?;
        let live_names: Vec<_> = live.iter().map(|c| c.name.as_str()).collect();
        let expected_names: Vec<_> = table.columns.iter().map(|c| c.name).collect();
        if live_names != expected_names {
            return Err(mismatch(format!(
                "{}: columns {live_names:?}, expected {expected_names:?}",
                table.name
            )));
        }

        let unique = unique_columns(conn, table.name)?;
        let autoincrement = uses_autoincrement(conn, table.name)?;

        for (column, info) in table.columns.iter().zip(&live) {
            let at = format!("{}.{}", table.name, column.name);
            if normalize_type(&info.declared_type) != normalize_type(&column.ty.sql()) {
                return Err(mismatch(format!(
                    "{at}: type {}, expected {}",
                    info.declared_type,
                    column.ty.sql()
                )));
            }
            if info.primary_key != column.primary_key {
                return Err(mismatch(format!("{at}: primary key flag differs")));
            }
            // SQLite reports notnull = 0 for INTEGER PRIMARY KEY.
            if !column.primary_key && info.not_null == column.nullable {
                return Err(mismatch(format!("{at}: nullability differs")));
            }
            if column.unique != unique.iter().any(|name| name == column.name) {
                return Err(mismatch(format!("{at}: unique constraint differs")));
            }
            if column.primary_key && column.auto_increment != autoincrement {
                return Err(mismatch(format!("{at}: AUTOINCREMENT differs")));
            }
            let expected_default = column.default.map(|d| d.sql());
            if info.default != expected_default {
                return Err(mismatch(format!(
                    "{at}: default {:?}, expected {expected_default:?}",
                    info.default
                )));
            }
        }

        let live_fks = foreign_keys(conn, table.name)?;
        let expected_fks: Vec<_> = table
            .columns
            .iter()
            .filter_map(|c| c.references.map(|fk| (c.name, fk)))
            .collect();
        if live_fks.len() != expected_fks.len() {
            return Err(mismatch(format!(
                "{}: {} foreign keys, expected {}",
                table.name,
                live_fks.len(),
                expected_fks.len()
            )));
        }
        for (column, fk) in expected_fks {
            let found = live_fks.iter().any(|live| {
                live.from == column
                    && live.table == fk.table
                    && live.to == fk.column
                    && live.on_delete == fk.on_delete.sql()
            });
            if !found {
                return Err(mismatch(format!(
                    "{}.{column}: missing foreign key to {}({}) ON DELETE {}",
                    table.name,
                    fk.table,
                    fk.column,
                    fk.on_delete.sql()
                )));
            }
        }
    }

    Ok(())
}

fn mismatch(detail: String) -> StoreError {
    StoreError::SchemaMismatch(detail)
}

fn normalize_type(declared: &str) -> String {
    declared
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}
