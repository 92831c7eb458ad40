use serde::Deserialize;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

/// One login, as accepted by the processing pipeline. Built once from a
/// parse attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginEvent {
    pub player_id: String,
    /// `None` for V1 events and for V2 events with an empty or null country
    /// ("unknown"). Never an empty string.
    pub country: Option<String>,
    pub schema: SchemaVersion,
}

/// V2 requires the `country` key to be present (null and "" are accepted);
/// a payload without it falls through to the V1 attempt. Unknown extra
/// fields are tolerated in both schemas.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoginV2 {
    player_id: String,
    #[serde(deserialize_with = "nullable_string")]
    country: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoginV1 {
    player_id: String,
}

// Declaring `deserialize_with` without `default` makes the key required
// while still accepting an explicit null.
fn nullable_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl LoginEvent {
    /// Parse a raw record, trying schema V2 first and falling back to V1 on
    /// structural failure. We deliberately do not probe for specific fields
    /// to pre-select a schema: a malformed V2 payload should fail over to V1
    /// rather than be mis-detected.
    pub fn parse(raw: &[u8]) -> Result<LoginEvent, ParseError> {
        match serde_json::from_slice::<RawLoginV2>(raw) {
            Ok(v2) => Self::from_v2(v2),
            Err(_) => match serde_json::from_slice::<RawLoginV1>(raw) {
                Ok(v1) => Self::from_v1(v1),
                Err(e) => Err(ParseError::UnknownSchema(e.to_string())),
            },
        }
    }

    fn from_v1(raw: RawLoginV1) -> Result<LoginEvent, ParseError> {
        if raw.player_id.is_empty() {
            return Err(ParseError::MissingPlayerId);
        }
        Ok(LoginEvent {
            player_id: raw.player_id,
            country: None,
            schema: SchemaVersion::V1,
        })
    }

    fn from_v2(raw: RawLoginV2) -> Result<LoginEvent, ParseError> {
        if raw.player_id.is_empty() {
            return Err(ParseError::MissingPlayerId);
        }
        Ok(LoginEvent {
            player_id: raw.player_id,
            country: raw.country.filter(|c| !c.is_empty()),
            schema: SchemaVersion::V2,
        })
    }
}
