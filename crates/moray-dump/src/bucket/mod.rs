//! Bucket configuration recovered from the dump.

mod loader;

pub use loader::{BucketConfigLoader, LoaderState};

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::dump::CopyRow;
use crate::error::{ExtractError, Result};

/// Bucket configurations keyed by bucket name.
pub type BucketMap = BTreeMap<String, BucketConfig>;

/// An indexed property and the column that backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    /// Property name in the document.
    pub key: String,
    /// Column name; PostgreSQL folds unquoted column names to lower case.
    pub lc_key: String,
}

impl IndexKey {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let lc_key = key.to_lowercase();
        Self { key, lc_key }
    }
}

/// Configuration of one bucket, as stored in the configuration table.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketConfig {
    pub name: String,
    /// Index definitions keyed by property name.
    pub index: Map<String, Value>,
    /// One entry per `index` property, in definition order.
    pub index_keys: Vec<IndexKey>,
    pub pre: Value,
    pub post: Value,
    pub options: Value,
    /// `None` when the column is null or not a timestamp.
    pub mtime: Option<DateTime<Utc>>,
    pub reindex_active: Option<Value>,
}

impl BucketConfig {
    /// Build a bucket configuration from a configuration-table row.
    pub fn from_row(table: &str, row: &CopyRow) -> Result<Self> {
        let name = row
            .get("name")
            .ok_or_else(|| ExtractError::invalid_row(table, "bucket row has no name"))?
            .to_string();

        if let Some(column) = row.invalid_utf8_column() {
            return Err(ExtractError::invalid_row(
                table,
                format!("bucket \"{}\": column {} is not valid UTF-8", name, column),
            ));
        }

        // A null JSON column reads as JSON null.
        let json = |column: &str, text: Option<&str>| -> Result<Value> {
            let Some(text) = text else {
                return Ok(Value::Null);
            };
            serde_json::from_str(text).map_err(|e| {
                ExtractError::invalid_row(
                    table,
                    format!("bucket \"{}\": column {}: {}", name, column, e),
                )
            })
        };

        let index = match json("index", row.get("index"))? {
            Value::Object(map) => map,
            other => {
                return Err(ExtractError::invalid_row(
                    table,
                    format!("bucket \"{}\": index is not an object: {}", name, other),
                ))
            }
        };
        let index_keys = index.keys().map(IndexKey::new).collect();

        let pre = json("pre", row.get("pre"))?;
        let post = json("post", row.get("post"))?;
        let options = json("options", Some(row.get("options").filter(|s| !s.is_empty()).unwrap_or("{}")))?;
        let reindex_active = match row.get("reindex_active").filter(|s| !s.is_empty()) {
            Some(text) => Some(json("reindex_active", Some(text))?),
            None => None,
        };

        let mtime = match row.get("mtime") {
            Some(text) => {
                let parsed = parse_timestamp(text);
                if parsed.is_none() {
                    warn!("bucket \"{}\": ignoring invalid mtime \"{}\"", name, text);
                }
                parsed
            }
            None => None,
        };

        Ok(Self {
            name,
            index,
            index_keys,
            pre,
            post,
            options,
            mtime,
            reindex_active,
        })
    }
}

/// Parse PostgreSQL `timestamp`/`timestamptz` text output or RFC 3339.
///
/// Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NULL;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn row(values: [&str; 7]) -> CopyRow {
        let pairs = crate::testing::CONFIG_COLUMNS
            .iter()
            .zip(values)
            .map(|(c, v)| (*c, if v == NULL { None } else { Some(v) }));
        CopyRow::from_pairs(pairs)
    }

    #[test]
    fn test_from_row() {
        let bucket = BucketConfig::from_row(
            "buckets_config",
            &row([
                "foo",
                r#"{"owner":{"type":"string"},"ContentLength":{"type":"number"}}"#,
                "[]",
                r#"["function post() {}"]"#,
                r#"{"version":2}"#,
                "2017-03-09 19:10:48.123456",
                NULL,
            ]),
        )
        .unwrap();

        assert_eq!(bucket.name, "foo");
        assert_eq!(
            bucket.index_keys,
            vec![IndexKey::new("owner"), IndexKey::new("ContentLength")]
        );
        assert_eq!(bucket.index_keys[1].lc_key, "contentlength");
        assert_eq!(bucket.pre, json!([]));
        assert_eq!(bucket.post, json!(["function post() {}"]));
        assert_eq!(bucket.options, json!({"version": 2}));
        let mtime = bucket.mtime.unwrap();
        assert_eq!(mtime.year(), 2017);
        assert_eq!(mtime.nanosecond(), 123_456_000);
        assert_eq!(bucket.reindex_active, None);
    }

    #[test]
    fn test_options_default_to_empty_object() {
        let bucket = BucketConfig::from_row(
            "buckets_config",
            &row(["foo", "{}", "[]", "[]", NULL, "2017-03-09 19:10:48", NULL]),
        )
        .unwrap();
        assert_eq!(bucket.options, json!({}));
        assert!(bucket.index_keys.is_empty());
    }

    #[test]
    fn test_options_column_may_be_absent() {
        let row = CopyRow::from_pairs([
            ("name", Some("foo")),
            ("index", Some("{}")),
            ("pre", Some("[]")),
            ("post", Some("[]")),
            ("mtime", Some("2017-03-09 19:10:48")),
        ]);
        let bucket = BucketConfig::from_row("buckets_config", &row).unwrap();
        assert_eq!(bucket.options, json!({}));
    }

    #[test]
    fn test_reindex_active_is_parsed_when_present() {
        let bucket = BucketConfig::from_row(
            "buckets_config",
            &row(["foo", "{}", "[]", "[]", "{}", "2017-03-09 19:10:48", r#"{"3":["a"]}"#]),
        )
        .unwrap();
        assert_eq!(bucket.reindex_active, Some(json!({"3": ["a"]})));
    }

    #[test]
    fn test_invalid_index_json() {
        let err = BucketConfig::from_row(
            "buckets_config",
            &row(["foo", "{not json", "[]", "[]", "{}", "2017-03-09 19:10:48", NULL]),
        )
        .unwrap_err();
        match err {
            ExtractError::InvalidRow { table, message } => {
                assert_eq!(table, "buckets_config");
                assert!(message.contains("index"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_name() {
        let err = BucketConfig::from_row(
            "buckets_config",
            &row([NULL, "{}", "[]", "[]", "{}", "2017-03-09 19:10:48", NULL]),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRow { .. }));
    }

    #[test]
    fn test_null_pre_and_post_read_as_json_null() {
        let bucket = BucketConfig::from_row(
            "buckets_config",
            &row(["foo", "{}", NULL, NULL, "{}", "2017-03-09 19:10:48", NULL]),
        )
        .unwrap();
        assert_eq!(bucket.pre, Value::Null);
        assert_eq!(bucket.post, Value::Null);
    }

    #[test]
    fn test_null_or_invalid_mtime_is_tolerated() {
        let bucket = BucketConfig::from_row(
            "buckets_config",
            &row(["foo", "{}", "[]", "[]", "{}", NULL, NULL]),
        )
        .unwrap();
        assert_eq!(bucket.mtime, None);

        let bucket = BucketConfig::from_row(
            "buckets_config",
            &row(["foo", "{}", "[]", "[]", "{}", "last tuesday", NULL]),
        )
        .unwrap();
        assert_eq!(bucket.mtime, None);
    }

    #[test]
    fn test_null_index_is_rejected() {
        let err = BucketConfig::from_row(
            "buckets_config",
            &row(["foo", NULL, "[]", "[]", "{}", "2017-03-09 19:10:48", NULL]),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRow { .. }));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let utc = parse_timestamp("2017-03-09 19:10:48.5+00").unwrap();
        assert_eq!(utc.hour(), 19);

        let offset = parse_timestamp("2017-03-09 19:10:48+02:00").unwrap();
        assert_eq!(offset.hour(), 17);

        let rfc = parse_timestamp("2017-03-09T19:10:48.000Z").unwrap();
        assert_eq!(rfc.minute(), 10);

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
