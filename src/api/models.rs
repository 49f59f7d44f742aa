//! Record shapes returned by the access-control API
//!
//! Fields the sync relies on are required; a record missing one fails to
//! deserialize and is quarantined by the client instead of flowing through
//! as a half-empty value. Informational fields default when absent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Envelope
// =============================================================================

/// Pagination metadata attached to list responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub last_page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Raw list response; `data` is kept untyped so records can be checked one by one
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub authentication_type: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<String>,
}

// =============================================================================
// Badges
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifierFormat {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifierType {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeIdentifier {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default, rename = "is_attributed")]
    pub is_attributed: Option<bool>,
    #[serde(default)]
    pub blocked: Option<bool>,
    /// Stable key correlating events to badges
    pub computed_identifier: String,
    #[serde(default, rename = "type")]
    pub kind: Option<IdentifierType>,
    #[serde(default)]
    pub format: Option<IdentifierFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeUser {
    pub id: i64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub blocked: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeRecord {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub mifare_profile: Option<String>,
    #[serde(default)]
    pub technology: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub encoding_date: Option<String>,
    #[serde(default)]
    pub encoding_size: Option<i64>,
    #[serde(default)]
    pub encoding_count: Option<i64>,
    #[serde(default)]
    pub encoding_info: Option<String>,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub update_date: Option<String>,
    #[serde(default)]
    pub quota_reached: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "virtual")]
    pub is_virtual: Option<i64>,
    #[serde(default)]
    pub virtual_design: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub identifier: Option<BadgeIdentifier>,
    #[serde(default)]
    pub user: Option<BadgeUser>,
}

// =============================================================================
// Accesses
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlUnit {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reference: Option<i64>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub protocol: Option<i64>,
    #[serde(default)]
    pub folder_path: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRecord {
    pub id: i64,
    /// Natural key of the graph device
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<i64>,
    #[serde(default)]
    pub disabled: Option<i64>,
    #[serde(default, rename = "subarea_id")]
    pub subarea_id: Option<i64>,
    #[serde(default)]
    pub control_unit: Option<ControlUnit>,
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventControlUnit {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    #[serde(default)]
    pub reception_date: Option<String>,
    /// When the event happened at the controller; used as the value timestamp
    pub source_date: String,
    pub sia_code: String,
    #[serde(default)]
    pub sia_code_complement: Option<String>,
    /// Access point name; null events cannot be mapped to a device
    #[serde(default)]
    pub unit: Option<String>,
    /// Computed identifier of the badge involved, if any
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub control_unit: Option<EventControlUnit>,
    #[serde(default)]
    pub stringified_evt: Option<String>,
    #[serde(default)]
    pub refusal_cause: Option<i64>,
}

// =============================================================================
// Timestamps
// =============================================================================

/// Local date-time layouts the API emits without an offset, read as UTC
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a date-time field from the API.
///
/// Accepts RFC 3339 and ISO 8601 without an offset, with either `T` or a
/// space between date and time and optional fractional seconds. Values
/// without an offset are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| naive.and_utc())
}
