//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use tessera_orm::{Connection, Record, Registry, Schema};
use tessera_sql::SqlDefault;
use tracing_subscriber::EnvFilter;

/// Entities of a small shop: products with variants and soft-deletable
/// tags, customers and orders referring to two customers.
pub const SHOP: &str = r#"[
    {
        "name": "Product",
        "table": "products",
        "capabilities": {"hasPositions": true},
        "fields": [
            {"key": "productId", "type": "id", "isIdentifier": true},
            {"key": "name", "type": "string"},
            {"key": "price", "type": "decimal", "decimals": 2}
        ],
        "subRequests": [
            {"key": "variants", "entity": "Variant", "childKey": "productId", "order": [["size", true]]},
            {"key": "variantsBySize", "entity": "Variant", "childKey": "productId",
             "shape": {"kind": "keyed", "field": "size"}, "value": "stock"},
            {"key": "variantsByColour", "entity": "Variant", "childKey": "productId",
             "shape": {"kind": "keyedList", "field": "colour"}, "value": ["size"]},
            {"key": "tags", "entity": "Tag", "childKey": "productId", "order": [["label", true]], "value": "label"}
        ]
    },
    {
        "name": "Tag",
        "table": "tags",
        "capabilities": {"softDelete": true},
        "fields": [
            {"key": "tagId", "type": "id", "isIdentifier": true},
            {"key": "productId", "type": "integer", "isParent": true},
            {"key": "label", "type": "string"}
        ]
    },
    {
        "name": "Variant",
        "table": "variants",
        "fields": [
            {"key": "variantId", "type": "id", "isIdentifier": true},
            {"key": "productId", "type": "integer", "isParent": true},
            {"key": "size", "type": "string"},
            {"key": "colour", "type": "string"},
            {"key": "stock", "type": "integer"}
        ]
    },
    {
        "name": "Order",
        "table": "orders",
        "fields": [
            {"key": "orderId", "type": "id", "isIdentifier": true},
            {"key": "customerId", "type": "integer"},
            {"key": "recipientId", "type": "integer"},
            {"key": "placedTime", "type": "timestamp"}
        ],
        "joins": [
            {"key": "customer", "table": "customers", "leftKey": "customerId", "rightKey": "customerId",
             "fields": [{"key": "name", "type": "string"}]},
            {"key": "recipient", "table": "customers", "leftKey": "customerId", "rightKey": "recipientId",
             "fields": [{"key": "name", "type": "string"}]}
        ],
        "counts": [
            {"key": "lineCount", "table": "orderLines", "groupKey": "orderId", "rightKey": "orderId"},
            {"key": "lineTotal", "table": "orderLines", "groupKey": "orderId", "rightKey": "orderId",
             "aggregate": {"kind": "sum", "column": "amount"}, "type": "decimal", "decimals": 2}
        ]
    }
]"#;

const SEED: &str = "
    CREATE TABLE products (
        productId INTEGER PRIMARY KEY AUTOINCREMENT,
        position INTEGER NOT NULL DEFAULT 0,
        name TEXT,
        price INTEGER
    );
    CREATE TABLE variants (
        variantId INTEGER PRIMARY KEY AUTOINCREMENT,
        productId INTEGER,
        size TEXT,
        colour TEXT,
        stock INTEGER
    );
    CREATE TABLE tags (
        tagId INTEGER PRIMARY KEY AUTOINCREMENT,
        isDeleted INTEGER NOT NULL DEFAULT 0,
        productId INTEGER,
        label TEXT
    );
    CREATE TABLE customers (customerId INTEGER PRIMARY KEY, name TEXT);
    CREATE TABLE orders (
        orderId INTEGER PRIMARY KEY AUTOINCREMENT,
        customerId INTEGER,
        recipientId INTEGER,
        placedTime INTEGER
    );
    CREATE TABLE orderLines (lineId INTEGER PRIMARY KEY, orderId INTEGER, amount INTEGER);

    INSERT INTO products (productId, position, name, price) VALUES
        (2, 2, 'Gadget', 550),
        (1, 1, 'Widget', 1999),
        (3, 3, 'Gizmo', 10);
    INSERT INTO variants (productId, size, colour, stock) VALUES
        (1, 'M', 'red', 4),
        (1, 'L', 'red', 2),
        (1, 'S', 'blue', 7),
        (2, 'M', 'green', 1);
    INSERT INTO tags (productId, label, isDeleted) VALUES
        (1, 'sale', 1),
        (1, 'new', 0),
        (1, 'steel', 0),
        (2, 'retired', 1);
    INSERT INTO customers (customerId, name) VALUES (1, 'Ann'), (2, 'Bob');
    INSERT INTO orders (customerId, recipientId, placedTime) VALUES (1, 2, 1709647620), (2, 2, 0);
    INSERT INTO orderLines (orderId, amount) VALUES (1, 1000), (1, 250), (2, 99);
";

/// Install a fmt subscriber honouring `RUST_LOG`; repeated calls are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The compiled shop entities.
#[allow(clippy::missing_panics_doc)]
pub fn registry() -> Registry {
    Registry::from_json(SHOP).expect("shop entities should compile")
}

/// An in-memory database holding the shop tables and rows.
#[allow(clippy::missing_panics_doc)]
pub fn database() -> Arc<dyn Connection> {
    init_tracing();
    let conn = SqlDefault::in_memory().expect("should open in-memory database");
    conn.execute_batch(SEED).expect("should seed database");
    Arc::new(conn)
}

/// A facade over one shop entity, backed by a freshly seeded database.
#[allow(clippy::missing_panics_doc)]
pub fn schema(entity: &str) -> Schema {
    let structure = registry().structure(entity).expect("entity should exist");
    Schema::new(structure, database())
}

/// A record from a JSON object literal.
#[allow(clippy::missing_panics_doc)]
pub fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().expect("record literal should be an object")
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '"' if !in_single_quote => {}
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
///
/// Identifier quotes and whitespace are normalized on both sides, so
/// fragments can be written without quoting.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        if let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) {
            search_start += pos + fragment_canonical.len();
        } else {
            panic!(
                "expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`"
            );
        }
    }
}
