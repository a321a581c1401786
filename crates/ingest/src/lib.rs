//! cfgmatch Ingest Layer
//!
//! This is where records enter the matcher. We take the raw JSON the download
//! subsystem left on disk, check the fields the matcher depends on, and hand
//! out typed [`Record`] values that downstream stages can rely on.
//!
//! ## What we do here
//!
//! - **Load record directories** - one JSON file per logical type, either a
//!   bare array or `{"type", "records"}`.
//! - **Type records** - read the identifier field of the record kind, fail
//!   with a typed error instead of panicking when it is missing.
//! - **Derive names** - settings objects, classic configurations and entities
//!   each have their own naming convention.
//! - **Extract entity references** - configurations are compared by the
//!   entities they point at, optionally translated through the result of an
//!   earlier entity match.
//!
//! ## Example
//!
//! ```
//! use ingest::{parse_records, RecordKind};
//! use serde_json::json;
//!
//! let kind = RecordKind::for_type("dashboard", false);
//! let records = parse_records(
//!     vec![json!({ "id": "d-1", "dashboardMetadata": { "name": "Overview" } })],
//!     &kind,
//!     None,
//! )
//! .unwrap();
//!
//! assert_eq!(records[0].id(), "d-1");
//! assert_eq!(records[0].name(), Some("Overview"));
//! ```
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn, Level};

mod entities;
mod error;
mod kind;
mod loader;
mod naming;
mod record;

pub use crate::entities::{
    entity_type_of, find_entity_ids, replace_in_map, scan_entities, EntityMatches, EntityScan,
};
pub use crate::error::IngestError;
pub use crate::kind::{
    RecordKind, CLASSIC_ID_KEY, DOWNLOADED_KEY, ENTITY_ID_KEY, FIRST_SEEN_KEY, SETTINGS_ID_KEY,
};
pub use crate::loader::{load_record_dir, RecordSets};
pub use crate::naming::{classic_name, derive_name, settings_name};
pub use crate::record::{parse_records, Record};

/// Type the raw records of one side of one type, with structured logging.
///
/// `side` only labels the log lines (`source` / `target`).
pub fn ingest_side(
    side: &str,
    values: Vec<Value>,
    kind: &RecordKind,
    entity_matches: Option<&EntityMatches>,
) -> Result<Vec<Record>, IngestError> {
    let start = Instant::now();
    let span = tracing::span!(
        Level::DEBUG,
        "ingest.side",
        side = %side,
        type_name = %kind.type_name()
    );
    let _guard = span.enter();

    let raw_count = values.len();
    match parse_records(values, kind, entity_matches) {
        Ok(records) => {
            info!(
                side = %side,
                type_name = %kind.type_name(),
                records = records.len(),
                elapsed_micros = start.elapsed().as_micros(),
                "ingest_success"
            );
            Ok(records)
        }
        Err(err) => {
            warn!(
                side = %side,
                type_name = %kind.type_name(),
                raw_records = raw_count,
                error = %err,
                elapsed_micros = start.elapsed().as_micros(),
                "ingest_failure"
            );
            Err(err)
        }
    }
}
