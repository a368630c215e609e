//! Declarative-schema query composition and result mapping for SQL databases.
//!
//! Entities are described once (fields, joins, aggregates, computed columns
//! and nested collections), compiled into immutable [`Structure`]s, and then
//! queried with a [`ConditionBuilder`]. Rows come back as JSON records keyed
//! by each field's output key.
//!
//! # Quick Start
//!
//! ## Describe Entities
//!
//! ```ignore
//! let registry = Registry::from_json(r#"[
//!     {
//!         "name": "Product",
//!         "table": "products",
//!         "capabilities": {"hasPositions": true, "softDelete": true},
//!         "fields": [
//!             {"key": "productId", "type": "id", "isIdentifier": true},
//!             {"key": "categoryId", "type": "integer", "isParent": true},
//!             {"key": "name", "type": "string"},
//!             {"key": "price", "type": "decimal", "decimals": 2}
//!         ],
//!         "joins": [
//!             {"key": "category", "table": "categories", "leftKey": "categoryId",
//!              "rightKey": "categoryId", "prefix": "category",
//!              "fields": [{"key": "name", "type": "string"}]}
//!         ],
//!         "subRequests": [
//!             {"key": "variants", "entity": "Variant", "childKey": "productId"}
//!         ]
//!     },
//!     ...
//! ]"#)?;
//! ```
//!
//! ## Query
//!
//! ```ignore
//! let schema = Schema::new(registry.structure("Product")?, conn);
//!
//! // `[{"id": 1, "name": "Widget", "price": 19.99, "categoryName": "Tools", "variants": [...]}, ...]`
//! let products = schema.get_entities(
//!     ConditionBuilder::new()
//!         .add("categoryId", "=", vec![1, 2])
//!         .search(&["name", "categoryName"], "wid")
//!         .paginate(1, 20),
//! )?;
//! let total = schema.get_total(ConditionBuilder::new().add("categoryId", "=", 1))?;
//! ```
//!
//! ## Write
//!
//! ```ignore
//! // appended to its category unless a position is given
//! let id = schema.create(&record)?;
//!
//! // moving to another category closes the gap it leaves behind
//! schema.edit(id, &changes)?;
//! schema.delete(id)?;
//! ```
//!
//! Lower-level pieces ([`Selection`], [`InsertBuilder`], [`UpdateBuilder`],
//! [`DeleteBuilder`]) are exported for statements the facade does not cover.

#![forbid(unsafe_code)]

mod condition;
mod count;
mod delete;
mod error;
mod field;
mod insert;
mod join;
mod options;
mod query;
mod registry;
mod schema;
mod selection;
mod structure;
mod subrequest;
mod update;
mod value;

pub use self::condition::{ConditionBuilder, Operand, SearchOptions};
pub use self::count::{Aggregate, CountSpec};
pub use self::delete::DeleteBuilder;
pub use self::error::{Error, Result};
pub use self::field::{DateMode, FieldFlags, FieldSpec, FieldType};
pub use self::insert::InsertBuilder;
pub use self::join::JoinSpec;
pub use self::options::MappingOptions;
pub use self::query::Query;
pub use self::registry::{EntityDescription, Registry, SubRequestDescription};
pub use self::schema::Schema;
pub use self::selection::Selection;
pub use self::structure::{Capabilities, ExpressionSpec, Structure, StructureBuilder};
pub use self::subrequest::{Shape, SubRequestSpec, ValueSelector, hydrate};
pub use self::update::UpdateBuilder;
// Re-export the connection types records are read from.
pub use tessera_sql::{Connection, DataType, Field, Row};

/// A resolved row: output keys to JSON values.
pub type Record = serde_json::Map<String, serde_json::Value>;
