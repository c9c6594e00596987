//! Upstream payload → storage field mapping
//!
//! Each synchronized entity type declares a static [`EntitySchema`]: its
//! table, writable columns and a converter table keyed by upstream field
//! name. Converters receive the raw value of their field and either leave
//! the target untouched (`None`) or emit `(target_column, value)`, which
//! lets upstream names differ from column names (`description` → `body`).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::data::EntityKind;

/// Payload field that could not be coerced into its column
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("entry must be a JSON object")]
    NotAnObject,

    #[error("entry is missing primary key field {0:?}")]
    MissingKey(&'static str),

    #[error("primary key field {field:?} is not an integer: {value}")]
    InvalidKey { field: &'static str, value: String },

    #[error("field {field:?} is not a valid date: {value}")]
    InvalidDate { field: String, value: String },

    #[error("field {field:?} expected {expected}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },
}

/// A normalized value ready to be bound to a column
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Null,
    Timestamp(DateTime<Utc>),
    Roles(Vec<String>),
    Flags(BTreeMap<String, String>),
    Json(Value),
}

/// Storage kind of a writable column, used for pass-through coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    OptionalText,
    Timestamp,
    OptionalTimestamp,
    Roles,
    Flags,
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

/// Converter for a single upstream field
pub type Converter = fn(&Value) -> Result<Option<(&'static str, FieldValue)>, MappingError>;

pub struct FieldConverter {
    /// Upstream payload key
    pub source: &'static str,
    pub convert: Converter,
}

/// Column → value output of a mapping run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedFields(BTreeMap<&'static str, FieldValue>);

impl MappedFields {
    pub fn insert(&mut self, column: &'static str, value: FieldValue) {
        self.0.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.0.iter().map(|(column, value)| (*column, value))
    }
}

/// Statically known description of a synchronized entity type
pub struct EntitySchema {
    pub kind: EntityKind,
    /// Webhook model selectors accepted for this type
    pub tags: &'static [&'static str],
    pub table: &'static str,
    /// Primary key column; also the payload key it is read from
    pub primary_key: &'static str,
    pub columns: &'static [Column],
    pub converters: &'static [FieldConverter],
    /// Column receiving the full payload on every synchronize
    pub original_column: Option<&'static str>,
    /// Values for required columns on first insert
    pub insert_defaults: fn(DateTime<Utc>) -> MappedFields,
}

impl EntitySchema {
    fn converter(&self, source: &str) -> Option<Converter> {
        self.converters
            .iter()
            .find(|converter| converter.source == source)
            .map(|converter| converter.convert)
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Map a raw upstream entry to storage fields.
    ///
    /// Keys without a converter are copied only when they name a writable
    /// column; unknown keys and the primary key are ignored.
    ///
    /// # Errors
    /// Returns `MappingError` when a value cannot be coerced
    pub fn map(&self, entry: &Value) -> Result<MappedFields, MappingError> {
        let object = entry.as_object().ok_or(MappingError::NotAnObject)?;
        let mut mapped = MappedFields::default();

        for (key, value) in object {
            if let Some(convert) = self.converter(key) {
                if let Some((column, converted)) = convert(value)? {
                    mapped.insert(column, converted);
                }
                continue;
            }

            if key == self.primary_key {
                continue;
            }

            let Some(column) = self.column(key) else {
                continue;
            };
            if let Some(converted) = coerce(column, value)? {
                mapped.insert(column.name, converted);
            }
        }

        if let Some(column) = self.original_column {
            mapped.insert(column, FieldValue::Json(entry.clone()));
        }

        Ok(mapped)
    }

    /// Read the upstream primary key (integer or numeric string)
    pub fn extract_key(&self, entry: &Value) -> Result<i64, MappingError> {
        let raw = entry
            .get(self.primary_key)
            .filter(|value| !value.is_null())
            .ok_or(MappingError::MissingKey(self.primary_key))?;

        let parsed = match raw {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };

        parsed.ok_or_else(|| MappingError::InvalidKey {
            field: self.primary_key,
            value: raw.to_string(),
        })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Article schema: Strapi "infocenter-article" entries
pub static ARTICLE_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Article,
    tags: &[
        "infocenter-article",
        "api::infocenter-article.infocenter-article",
    ],
    table: "articles",
    primary_key: "id",
    columns: &[
        Column {
            name: "created",
            kind: ColumnKind::Timestamp,
        },
        Column {
            name: "updated",
            kind: ColumnKind::Timestamp,
        },
        Column {
            name: "published",
            kind: ColumnKind::OptionalTimestamp,
        },
        Column {
            name: "title",
            kind: ColumnKind::Text,
        },
        Column {
            name: "subtitle",
            kind: ColumnKind::OptionalText,
        },
        Column {
            name: "teaser",
            kind: ColumnKind::Text,
        },
        Column {
            name: "body",
            kind: ColumnKind::OptionalText,
        },
        Column {
            name: "link",
            kind: ColumnKind::OptionalText,
        },
        Column {
            name: "image",
            kind: ColumnKind::OptionalText,
        },
        Column {
            name: "roles",
            kind: ColumnKind::Roles,
        },
        Column {
            name: "flags",
            kind: ColumnKind::Flags,
        },
    ],
    converters: &[
        FieldConverter {
            source: "description",
            convert: article_description,
        },
        FieldConverter {
            source: "createdAt",
            convert: article_created_at,
        },
        FieldConverter {
            source: "updatedAt",
            convert: article_updated_at,
        },
        FieldConverter {
            source: "publishedAt",
            convert: article_published_at,
        },
        FieldConverter {
            source: "role",
            convert: article_roles,
        },
        FieldConverter {
            source: "roles",
            convert: article_roles,
        },
        FieldConverter {
            source: "image",
            convert: article_image,
        },
    ],
    original_column: Some("original"),
    insert_defaults: article_insert_defaults,
};

static SCHEMAS: &[&EntitySchema] = &[&ARTICLE_SCHEMA];

/// Resolve a webhook model selector to its schema
pub fn schema_for_tag(tag: &str) -> Option<&'static EntitySchema> {
    SCHEMAS
        .iter()
        .copied()
        .find(|schema| schema.tags.iter().any(|candidate| *candidate == tag))
}

fn article_description(value: &Value) -> Result<Option<(&'static str, FieldValue)>, MappingError> {
    Ok(optional_text("description", value)?.map(|text| ("body", text)))
}

fn article_created_at(value: &Value) -> Result<Option<(&'static str, FieldValue)>, MappingError> {
    Ok(timestamp("createdAt", value)?.map(|ts| ("created", ts)))
}

fn article_updated_at(value: &Value) -> Result<Option<(&'static str, FieldValue)>, MappingError> {
    Ok(timestamp("updatedAt", value)?.map(|ts| ("updated", ts)))
}

fn article_published_at(
    value: &Value,
) -> Result<Option<(&'static str, FieldValue)>, MappingError> {
    Ok(timestamp("publishedAt", value)?.map(|ts| ("published", ts)))
}

fn article_roles(value: &Value) -> Result<Option<(&'static str, FieldValue)>, MappingError> {
    Ok(roles("roles", value)?.map(|roles| ("roles", roles)))
}

fn article_image(value: &Value) -> Result<Option<(&'static str, FieldValue)>, MappingError> {
    let converted = match value {
        Value::Null => FieldValue::Null,
        Value::String(path) => FieldValue::Text(path.clone()),
        Value::Object(media) => match media.get("url") {
            Some(Value::String(url)) => FieldValue::Text(url.clone()),
            Some(Value::Null) | None => FieldValue::Null,
            Some(_) => {
                return Err(MappingError::InvalidType {
                    field: "image.url".to_string(),
                    expected: "a string",
                });
            }
        },
        _ => {
            return Err(MappingError::InvalidType {
                field: "image".to_string(),
                expected: "a string or an object with a url",
            });
        }
    };
    Ok(Some(("image", converted)))
}

fn article_insert_defaults(now: DateTime<Utc>) -> MappedFields {
    let mut defaults = MappedFields::default();
    defaults.insert("created", FieldValue::Timestamp(now));
    defaults.insert("updated", FieldValue::Timestamp(now));
    defaults.insert("title", FieldValue::Text(String::new()));
    defaults.insert("teaser", FieldValue::Text(String::new()));
    defaults.insert("roles", FieldValue::Roles(Vec::new()));
    defaults.insert("flags", FieldValue::Flags(BTreeMap::new()));
    defaults.insert("original", FieldValue::Json(Value::Object(Default::default())));
    defaults
}

// =============================================================================
// Coercion helpers
// =============================================================================

fn coerce(column: &Column, value: &Value) -> Result<Option<FieldValue>, MappingError> {
    match column.kind {
        ColumnKind::Text => match value {
            Value::Null => Err(MappingError::InvalidType {
                field: column.name.to_string(),
                expected: "a non-null value",
            }),
            other => optional_text(column.name, other),
        },
        ColumnKind::OptionalText => optional_text(column.name, value),
        ColumnKind::Timestamp | ColumnKind::OptionalTimestamp => timestamp(column.name, value),
        ColumnKind::Roles => roles(column.name, value),
        ColumnKind::Flags => flags(column.name, value),
    }
}

fn optional_text(field: &str, value: &Value) -> Result<Option<FieldValue>, MappingError> {
    match value {
        Value::Null => Ok(Some(FieldValue::Null)),
        Value::String(text) => Ok(Some(FieldValue::Text(text.clone()))),
        Value::Number(number) => Ok(Some(FieldValue::Text(number.to_string()))),
        Value::Bool(flag) => Ok(Some(FieldValue::Text(flag.to_string()))),
        _ => Err(MappingError::InvalidType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

/// Null dates map to nothing so stored timestamps are never cleared.
fn timestamp(field: &str, value: &Value) -> Result<Option<FieldValue>, MappingError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => parse_timestamp(text)
            .map(|ts| Some(FieldValue::Timestamp(ts)))
            .ok_or_else(|| MappingError::InvalidDate {
                field: field.to_string(),
                value: text.clone(),
            }),
        other => Err(MappingError::InvalidDate {
            field: field.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Parse ISO 8601 text; offset-less values are taken as UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn roles(field: &str, value: &Value) -> Result<Option<FieldValue>, MappingError> {
    if value.is_null() {
        return Ok(None);
    }
    let tags = collect_role_tags(value).ok_or_else(|| MappingError::InvalidType {
        field: field.to_string(),
        expected: "a role tag, a {value} object or a list of them",
    })?;
    Ok(Some(FieldValue::Roles(tags)))
}

fn collect_role_tags(value: &Value) -> Option<Vec<String>> {
    fn single(value: &Value) -> Option<String> {
        match value {
            Value::String(tag) => Some(tag.clone()),
            Value::Object(object) => object.get("value")?.as_str().map(str::to_string),
            _ => None,
        }
    }

    let mut tags: Vec<String> = Vec::new();
    let candidates = match value {
        Value::Array(items) => items.iter().map(single).collect::<Option<Vec<_>>>()?,
        other => vec![single(other)?],
    };
    for tag in candidates {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Some(tags)
}

/// Role tags an entry declares, for ingestion eligibility checks
pub fn entry_roles(entry: &Value) -> Vec<String> {
    ["roles", "role"]
        .into_iter()
        .filter_map(|key| entry.get(key))
        .filter(|value| !value.is_null())
        .find_map(collect_role_tags)
        .unwrap_or_default()
}

fn flags(field: &str, value: &Value) -> Result<Option<FieldValue>, MappingError> {
    let object = match value {
        Value::Null => return Ok(None),
        Value::Object(object) => object,
        _ => {
            return Err(MappingError::InvalidType {
                field: field.to_string(),
                expected: "an object",
            });
        }
    };

    let flags = object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect();
    Ok(Some(FieldValue::Flags(flags)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn description_is_renamed_to_body() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({"id": "42", "description": "<p>hi</p>"}))
            .unwrap();

        assert_eq!(
            mapped.get("body"),
            Some(&FieldValue::Text("<p>hi</p>".to_string()))
        );
        assert!(!mapped.contains("description"));
    }

    #[test]
    fn dates_are_parsed_into_timestamps() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-02T12:30:00.000Z",
            }))
            .unwrap();

        assert_eq!(
            mapped.get("created"),
            Some(&FieldValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            ))
        );
        assert_eq!(
            mapped.get("updated"),
            Some(&FieldValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 1, 2, 12, 30, 0).unwrap()
            ))
        );
    }

    #[test]
    fn null_published_at_leaves_field_untouched() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({"publishedAt": null}))
            .unwrap();
        assert!(!mapped.contains("published"));

        let mapped = ARTICLE_SCHEMA.map(&json!({"title": "x"})).unwrap();
        assert!(!mapped.contains("published"));
    }

    #[test]
    fn malformed_date_is_a_mapping_error() {
        let error = ARTICLE_SCHEMA
            .map(&json!({"createdAt": "last tuesday"}))
            .unwrap_err();
        assert!(matches!(error, MappingError::InvalidDate { field, .. } if field == "createdAt"));
    }

    #[test]
    fn single_role_becomes_one_element_set() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({"role": {"value": "staff"}}))
            .unwrap();
        assert_eq!(
            mapped.get("roles"),
            Some(&FieldValue::Roles(vec!["staff".to_string()]))
        );
    }

    #[test]
    fn role_lists_are_deduplicated_in_order() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({"roles": ["student", {"value": "staff"}, "student"]}))
            .unwrap();
        assert_eq!(
            mapped.get("roles"),
            Some(&FieldValue::Roles(vec![
                "student".to_string(),
                "staff".to_string()
            ]))
        );
    }

    #[test]
    fn unknown_keys_are_ignored_and_columns_pass_through() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({
                "id": 7,
                "title": "Hello",
                "subtitle": null,
                "locale": "de",
            }))
            .unwrap();

        assert_eq!(
            mapped.get("title"),
            Some(&FieldValue::Text("Hello".to_string()))
        );
        assert_eq!(mapped.get("subtitle"), Some(&FieldValue::Null));
        assert!(!mapped.contains("locale"));
        assert!(!mapped.contains("id"));
    }

    #[test]
    fn null_required_text_is_rejected() {
        let error = ARTICLE_SCHEMA.map(&json!({"title": null})).unwrap_err();
        assert!(matches!(error, MappingError::InvalidType { field, .. } if field == "title"));
    }

    #[test]
    fn image_url_is_extracted_from_media_object() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({"image": {"url": "/uploads/a.jpg", "width": 10}}))
            .unwrap();
        assert_eq!(
            mapped.get("image"),
            Some(&FieldValue::Text("/uploads/a.jpg".to_string()))
        );
    }

    #[test]
    fn flags_are_stringified() {
        let mapped = ARTICLE_SCHEMA
            .map(&json!({"flags": {"export": true, "channel": "web", "skip": null}}))
            .unwrap();
        let mut expected = BTreeMap::new();
        expected.insert("export".to_string(), "true".to_string());
        expected.insert("channel".to_string(), "web".to_string());
        assert_eq!(mapped.get("flags"), Some(&FieldValue::Flags(expected)));
    }

    #[test]
    fn original_payload_is_retained() {
        let entry = json!({"id": 1, "title": "x"});
        let mapped = ARTICLE_SCHEMA.map(&entry).unwrap();
        assert_eq!(mapped.get("original"), Some(&FieldValue::Json(entry)));
    }

    #[test]
    fn non_object_entries_are_rejected() {
        assert_eq!(
            ARTICLE_SCHEMA.map(&json!([1, 2])).unwrap_err(),
            MappingError::NotAnObject
        );
    }

    #[test]
    fn key_accepts_numbers_and_numeric_strings() {
        assert_eq!(ARTICLE_SCHEMA.extract_key(&json!({"id": 42})), Ok(42));
        assert_eq!(ARTICLE_SCHEMA.extract_key(&json!({"id": "42"})), Ok(42));
        assert_eq!(
            ARTICLE_SCHEMA.extract_key(&json!({})),
            Err(MappingError::MissingKey("id"))
        );
        assert!(matches!(
            ARTICLE_SCHEMA.extract_key(&json!({"id": "abc"})),
            Err(MappingError::InvalidKey { .. })
        ));
    }

    #[test]
    fn timestamps_without_offset_are_utc() {
        assert_eq!(
            parse_timestamp("2024-03-05T10:00:00"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2024-03-05"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("soon"), None);
    }

    #[test]
    fn registry_resolves_both_selectors() {
        assert!(schema_for_tag("infocenter-article").is_some());
        assert!(schema_for_tag("api::infocenter-article.infocenter-article").is_some());
        assert!(schema_for_tag("api::event.event").is_none());
    }

    #[test]
    fn entry_roles_reads_role_or_roles() {
        assert_eq!(entry_roles(&json!({"role": {"value": "a"}})), vec!["a"]);
        assert_eq!(entry_roles(&json!({"roles": ["a", "b"]})), vec!["a", "b"]);
        assert!(entry_roles(&json!({})).is_empty());
    }
}
