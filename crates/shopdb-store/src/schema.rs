//! Declarative table descriptors.
//!
//! A [`Table`] is a static list of [`Column`]s built in `const` context.  The
//! descriptors render the SQLite DDL used by the migrations and are the
//! reference that [`crate::inspect::verify_schema`] checks a live database
//! against.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Column types and defaults
// ---------------------------------------------------------------------------

/// Logical column type and its SQLite spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    /// Bounded string.  SQLite keeps the length as declared metadata only.
    Varchar { length: u16 },
    Timestamp,
    /// Fixed-point decimal: `precision` digits total, `scale` after the point.
    Numeric { precision: u8, scale: u8 },
}

impl ColumnType {
    /// Declared type as written into `CREATE TABLE`.
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Varchar { length } => format!("VARCHAR({length})"),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Numeric { precision, scale } => format!("NUMERIC({precision}, {scale})"),
        }
    }
}

/// Server-side default, evaluated by the storage engine on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ColumnDefault {
    CurrentTimestamp,
    Text(&'static str),
    /// Numeric literal, kept verbatim (`"0.00"`, `"1"`).
    Number(&'static str),
}

impl ColumnDefault {
    pub fn sql(&self) -> String {
        match self {
            ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            ColumnDefault::Text(text) => format!("'{}'", text.replace('\'', "''")),
            ColumnDefault::Number(literal) => (*literal).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Foreign keys
// ---------------------------------------------------------------------------

/// Action taken on dependent rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

impl OnDelete {
    /// Spelling used both in DDL and in `PRAGMA foreign_key_list`.
    pub fn sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::SetNull => "SET NULL",
            OnDelete::NoAction => "NO ACTION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: OnDelete,
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// A single column.  Columns are nullable unless marked otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    pub references: Option<ForeignKey>,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
            references: None,
        }
    }

    /// System-assigned, monotonically increasing integer identity.
    pub const fn auto_primary_key(mut self) -> Self {
        self.primary_key = true;
        self.auto_increment = true;
        self.nullable = false;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn references(
        mut self,
        table: &'static str,
        column: &'static str,
        on_delete: OnDelete,
    ) -> Self {
        self.references = Some(ForeignKey {
            table,
            column,
            on_delete,
        });
        self
    }

    /// Column clause of `CREATE TABLE`, without the trailing comma.
    fn definition_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.ty.sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.auto_increment {
                sql.push_str(" AUTOINCREMENT");
            }
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.sql());
        }
        sql
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl Table {
    /// Names of the tables this one references, in column order.
    pub fn dependencies(&self) -> impl Iterator<Item = &'static str> {
        self.columns
            .iter()
            .filter_map(|c| c.references.map(|fk| fk.table))
    }

    /// `CREATE TABLE` statement.  Fails at execution time if the table exists.
    pub fn create_sql(&self) -> String {
        let mut clauses: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.definition_sql()))
            .collect();

        // FK constraints go last, after every column has been declared.
        for column in self.columns {
            if let Some(fk) = column.references {
                clauses.push(format!(
                    "    FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
                    column.name,
                    fk.table,
                    fk.column,
                    fk.on_delete.sql()
                ));
            }
        }

        format!("CREATE TABLE {} (\n{}\n);", self.name, clauses.join(",\n"))
    }

    /// `DROP TABLE` statement.  Fails at execution time if the table is missing.
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE {};", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT_COLUMNS: &[Column] = &[
        Column::new("id", ColumnType::Integer).auto_primary_key(),
        Column::new("label", ColumnType::Varchar { length: 30 })
            .not_null()
            .unique(),
    ];

    const CHILD_COLUMNS: &[Column] = &[
        Column::new("id", ColumnType::Integer).auto_primary_key(),
        Column::new("parent_id", ColumnType::Integer)
            .not_null()
            .references("parent", "id", OnDelete::Cascade),
        Column::new("state", ColumnType::Varchar { length: 10 })
            .default(ColumnDefault::Text("it's")),
    ];

    const PARENT: Table = Table {
        name: "parent",
        columns: PARENT_COLUMNS,
    };

    const CHILD: Table = Table {
        name: "child",
        columns: CHILD_COLUMNS,
    };

    #[test]
    fn test_type_spelling() {
        assert_eq!(ColumnType::Integer.sql(), "INTEGER");
        assert_eq!(ColumnType::Varchar { length: 100 }.sql(), "VARCHAR(100)");
        assert_eq!(
            ColumnType::Numeric {
                precision: 10,
                scale: 2
            }
            .sql(),
            "NUMERIC(10, 2)"
        );
    }

    #[test]
    fn test_text_default_is_escaped() {
        assert_eq!(ColumnDefault::Text("it's").sql(), "'it''s'");
        assert_eq!(ColumnDefault::Number("0.00").sql(), "0.00");
    }

    #[test]
    fn test_create_sql() {
        let sql = CHILD.create_sql();
        assert!(sql.starts_with("CREATE TABLE child ("));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("parent_id INTEGER NOT NULL,"));
        assert!(sql.contains("state VARCHAR(10) DEFAULT 'it''s'"));
        assert!(sql.contains("FOREIGN KEY (parent_id) REFERENCES parent(id) ON DELETE CASCADE"));
        assert!(!sql.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_generated_sql_executes() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&PARENT.create_sql()).unwrap();
        conn.execute_batch(&CHILD.create_sql()).unwrap();

        // Second create must fail: no IF NOT EXISTS.
        assert!(conn.execute_batch(&PARENT.create_sql()).is_err());

        conn.execute_batch(&CHILD.drop_sql()).unwrap();
        conn.execute_batch(&PARENT.drop_sql()).unwrap();
        assert!(conn.execute_batch(&PARENT.drop_sql()).is_err());
    }

    #[test]
    fn test_dependencies() {
        assert_eq!(CHILD.dependencies().collect::<Vec<_>>(), vec!["parent"]);
        assert_eq!(PARENT.dependencies().count(), 0);
    }

    /// Child table whose nullable `parent_id` uses `on_delete`.
    fn child_with(on_delete: OnDelete) -> Table {
        let columns: &'static [Column] = Box::leak(Box::new([
            Column::new("id", ColumnType::Integer).auto_primary_key(),
            Column::new("parent_id", ColumnType::Integer).references("parent", "id", on_delete),
        ]));
        Table {
            name: "child",
            columns,
        }
    }

    /// Delete the referenced parent row and report what happened to the child.
    fn delete_parent_under(on_delete: OnDelete) -> Result<Option<Option<i64>>, rusqlite::Error> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        let child = child_with(on_delete);
        conn.execute_batch(&PARENT.create_sql()).unwrap();
        conn.execute_batch(&child.create_sql()).unwrap();
        crate::inspect::verify_schema(&conn, &[PARENT, child]).unwrap();

        conn.execute("INSERT INTO parent (label) VALUES ('p')", []).unwrap();
        conn.execute("INSERT INTO child (parent_id) VALUES (1)", []).unwrap();
        conn.execute("DELETE FROM parent WHERE id = 1", [])?;

        use rusqlite::OptionalExtension;
        Ok(conn
            .query_row("SELECT parent_id FROM child WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .unwrap())
    }

    #[test]
    fn test_on_delete_actions() {
        // Child row gone.
        assert_eq!(delete_parent_under(OnDelete::Cascade).unwrap(), None);
        // Child row kept, link cleared.
        assert_eq!(delete_parent_under(OnDelete::SetNull).unwrap(), Some(None));
        // Parent delete refused while referenced.
        assert!(delete_parent_under(OnDelete::Restrict).is_err());
        assert!(delete_parent_under(OnDelete::NoAction).is_err());
    }

    #[test]
    fn test_on_delete_spelling_matches_pragma() {
        for action in [
            OnDelete::Cascade,
            OnDelete::Restrict,
            OnDelete::SetNull,
            OnDelete::NoAction,
        ] {
            let conn = rusqlite::Connection::open_in_memory().unwrap();
            conn.execute_batch(&PARENT.create_sql()).unwrap();
            conn.execute_batch(&child_with(action).create_sql()).unwrap();
            let fks = crate::inspect::foreign_keys(&conn, "child").unwrap();
            assert_eq!(fks[0].on_delete, action.sql());
        }
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(CHILD).unwrap();
        assert_eq!(json["name"], "child");
        assert_eq!(json["columns"][1]["references"]["on_delete"], "cascade");
        assert_eq!(json["columns"][2]["type"]["kind"], "varchar");
        assert_eq!(json["columns"][2]["type"]["length"], 10);
    }
}
