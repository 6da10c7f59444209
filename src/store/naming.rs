//! Pure helpers for ids, display names and filenames.

use serde_json::Value;

/// Fields tried, in order, for a team's display name
pub const TEAM_NAME_FIELDS: &[&str] = &["name", "cleanName", "full_name", "english_name"];

/// Fields tried, in order, for a player's or referee's display name
pub const PERSON_NAME_FIELDS: &[&str] = &["known_as", "full_name", "first_name"];

/// Longest sanitised name kept in a filename
pub const MAX_NAME_LEN: usize = 50;

/// First non-empty string among `fields` of `payload`
pub fn first_non_empty(payload: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Team display name, `Team_<id>` when none is present
pub fn team_name(payload: &Value, id: i64) -> String {
    first_non_empty(payload, TEAM_NAME_FIELDS).unwrap_or_else(|| format!("Team_{id}"))
}

/// Player display name, `Player_<id>` when none is present
pub fn player_name(payload: &Value, id: i64) -> String {
    first_non_empty(payload, PERSON_NAME_FIELDS).unwrap_or_else(|| format!("Player_{id}"))
}

/// Referee display name, `Referee_<id>` when none is present
pub fn referee_name(payload: &Value, id: i64) -> String {
    first_non_empty(payload, PERSON_NAME_FIELDS).unwrap_or_else(|| format!("Referee_{id}"))
}

/// Filename-safe form of a display name.
///
/// Spaces become `_`, anything but alphanumerics, `_` and `-` is dropped, the
/// result is lowercased and cut to [`MAX_NAME_LEN`] characters.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .flat_map(char::to_lowercase)
        .take(MAX_NAME_LEN)
        .collect()
}

/// The record's `id` field, as a number or a numeric string
pub fn entity_id(payload: &Value) -> Option<i64> {
    as_id(payload.get("id")?)
}

/// Interpret a JSON value as an id
pub fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
