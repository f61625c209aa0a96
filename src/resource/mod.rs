//! Resource declaration layer
//!
//! This module provides a data-driven approach to declaring managed
//! resources. Kind schemas are loaded from JSON files at compile time, so
//! an option can be added to a kind without touching validation code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches kind schemas from embedded JSON
//! - [`declaration`] - Validates option records against a kind schema
//! - [`value`] - Typed option values and attribute references
//! - [`names`] - Provider rules for explicit physical names
//!
//! # Kind Schemas
//!
//! Schemas are defined in JSON files under `src/resources/`:
//! - `storage.json` - Storage buckets
//! - `delivery.json` - CDN distributions
//! - `data.json` - Tables and log groups
//! - `compute.json` - Functions
//! - `api.json` - API gateways and their resource paths
//!
//! # Example
//!
//! ```
//! use sitestack::resource::{options, ResourceDeclaration, ResourceKind};
//!
//! let table = ResourceDeclaration::declare(
//!     "items-table",
//!     ResourceKind::Table,
//!     options([("partitionKeyName", "id".into()), ("partitionKeyType", "STRING".into())]),
//! )
//! .unwrap();
//! assert_eq!(table.str_opt("billingMode"), Some("PAY_PER_REQUEST"));
//! ```

pub mod declaration;
mod kind;
pub mod names;
pub mod registry;
mod value;

pub use declaration::{validate_id, ResourceDeclaration, TABLE_NAME_ENV};
pub use kind::ResourceKind;
pub use names::NameFormat;
pub use registry::{all_kinds, schema, KindSchema, OptionDef, OptionType};
pub use value::{options, AttributeRef, ConfigValue, Options};
