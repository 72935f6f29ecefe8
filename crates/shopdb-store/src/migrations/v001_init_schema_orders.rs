//! v001 -- Initial schema: `users`, `orders`, `order_items`.
//!
//! Root of the revision chain.  Orders belong to a user and order items
//! belong to an order; both links cascade on delete.

use rusqlite::Connection;

use crate::schema::{Column, ColumnDefault, ColumnType, OnDelete, Table};

use super::Migration;

pub const REVISION: &str = "init_schema_orders";

pub const MIGRATION: Migration = Migration {
    revision: REVISION,
    down_revision: None,
    description: "create users, orders and order_items",
    tables: &TABLES,
    up,
    down,
};

const MONEY: ColumnType = ColumnType::Numeric {
    precision: 10,
    scale: 2,
};

// ----------------------------------------------------------------
// Users
// ----------------------------------------------------------------
const USERS_COLUMNS: &[Column] = &[
    Column::new("id", ColumnType::Integer).auto_primary_key(),
    Column::new("name", ColumnType::Varchar { length: 100 }).not_null(),
    Column::new("email", ColumnType::Varchar { length: 100 })
        .not_null()
        .unique(),
    Column::new("phone", ColumnType::Varchar { length: 20 }),
    Column::new("created_at", ColumnType::Timestamp).default(ColumnDefault::CurrentTimestamp),
];

// ----------------------------------------------------------------
// Orders
// ----------------------------------------------------------------
const ORDERS_COLUMNS: &[Column] = &[
    Column::new("id", ColumnType::Integer).auto_primary_key(),
    Column::new("user_id", ColumnType::Integer)
        .not_null()
        .references("users", "id", OnDelete::Cascade),
    Column::new("order_date", ColumnType::Timestamp).default(ColumnDefault::CurrentTimestamp),
    Column::new("status", ColumnType::Varchar { length: 20 }).default(ColumnDefault::Text("new")),
    Column::new("total_amount", MONEY)
        .not_null()
        .default(ColumnDefault::Number("0.00")),
];

// ----------------------------------------------------------------
// Order items
// ----------------------------------------------------------------
const ORDER_ITEMS_COLUMNS: &[Column] = &[
    Column::new("id", ColumnType::Integer).auto_primary_key(),
    Column::new("order_id", ColumnType::Integer)
        .not_null()
        .references("orders", "id", OnDelete::Cascade),
    Column::new("product_name", ColumnType::Varchar { length: 200 }).not_null(),
    Column::new("quantity", ColumnType::Integer)
        .not_null()
        .default(ColumnDefault::Number("1")),
    Column::new("price", MONEY)
        .not_null()
        .default(ColumnDefault::Number("0.00")),
];

pub const USERS: Table = Table {
    name: "users",
    columns: USERS_COLUMNS,
};

pub const ORDERS: Table = Table {
    name: "orders",
    columns: ORDERS_COLUMNS,
};

pub const ORDER_ITEMS: Table = Table {
    name: "order_items",
    columns: ORDER_ITEMS_COLUMNS,
};

/// Creation order.  A table only appears after every table it references.
pub const TABLES: [Table; 3] = [USERS, ORDERS, ORDER_ITEMS];

/// Create the three tables in dependency order.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    for table in &TABLES {
        tracing::debug!(table = table.name, "creating table");
        conn.execute_batch(&table.create_sql())?;
    }
    Ok(())
}

/// Drop the three tables, children first.
pub fn down(conn: &Connection) -> Result<(), rusqlite::Error> {
    for table in TABLES.iter().rev() {
        tracing::debug!(table = table.name, "dropping table");
        conn.execute_batch(&table.drop_sql())?;
    }
    Ok(())
}
