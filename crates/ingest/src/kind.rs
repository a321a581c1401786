//! Record kinds and the identifier/name conventions attached to each.
use serde::{Deserialize, Serialize};

/// Identifier field carried by monitored entities.
pub const ENTITY_ID_KEY: &str = "entityId";
/// First-seen timestamp (epoch milliseconds) carried by monitored entities.
pub const FIRST_SEEN_KEY: &str = "firstSeenTms";
/// Identifier field of classic API configurations.
pub const CLASSIC_ID_KEY: &str = "id";
/// Identifier field of settings objects.
pub const SETTINGS_ID_KEY: &str = "objectId";
/// Envelope key the download subsystem wraps configuration payloads in.
pub const DOWNLOADED_KEY: &str = "downloaded";

/// The shape of the records of one logical type.
///
/// The kind decides which field holds the external identifier, how a
/// human-readable name is derived, and whether entity references are
/// extracted from the body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    /// Monitored entity (`HOST`, `SERVICE`, ...).
    Entity { entities_type: String },
    /// Configuration from a classic API (`dashboard`, `alerting-profile`, ...).
    Classic { api: String },
    /// Settings 2.0 object of one schema (`builtin:alerting.profile`, ...).
    Settings { schema: String },
}

impl RecordKind {
    /// Infer the kind for a type name.
    ///
    /// Entity matching always yields [`RecordKind::Entity`]. For configuration
    /// matching, schema ids contain a `:` (`builtin:...`), anything else is a
    /// classic API name.
    pub fn for_type(type_name: &str, entities: bool) -> Self {
        if entities {
            RecordKind::Entity {
                entities_type: type_name.to_string(),
            }
        } else if type_name.contains(':') {
            RecordKind::Settings {
                schema: type_name.to_string(),
            }
        } else {
            RecordKind::Classic {
                api: type_name.to_string(),
            }
        }
    }

    /// Name of the field holding the external identifier.
    pub fn id_field(&self) -> &'static str {
        match self {
            RecordKind::Entity { .. } => ENTITY_ID_KEY,
            RecordKind::Classic { .. } => CLASSIC_ID_KEY,
            RecordKind::Settings { .. } => SETTINGS_ID_KEY,
        }
    }

    /// Logical type name the kind was built for.
    pub fn type_name(&self) -> &str {
        match self {
            RecordKind::Entity { entities_type } => entities_type,
            RecordKind::Classic { api } => api,
            RecordKind::Settings { schema } => schema,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, RecordKind::Entity { .. })
    }

    /// Configuration records may arrive wrapped in the download envelope and
    /// reference entities; entity records do neither.
    pub fn is_config(&self) -> bool {
        !self.is_entity()
    }
}
