//! Row-to-document reconciliation.
//!
//! Moray's bulk update can change an index column without rewriting the
//! serialized `_value` payload, so the index columns are authoritative: the
//! document is rebuilt the way the Moray server's `rowToObject()` does.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::bucket::BucketConfig;
use crate::dump::CopyRow;
use crate::error::{ExtractError, Result};

/// One exported document and its row metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub bucket: String,
    pub key: Option<String>,
    pub value: Value,
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(rename = "_etag")]
    pub etag: Option<String>,
    #[serde(rename = "_mtime")]
    pub mtime: Option<i64>,
    #[serde(rename = "_txn_snap")]
    pub txn_snapshot: Option<String>,
}

/// Rebuild the document stored in `row` of `bucket`'s table.
pub fn reconcile(bucket: &BucketConfig, row: &CopyRow) -> Result<DocumentRecord> {
    if let Some(column) = row.invalid_utf8_column() {
        return Err(ExtractError::invalid_row(
            &bucket.name,
            format!("column {} is not valid UTF-8", column),
        ));
    }

    let payload = row
        .get("_value")
        .ok_or_else(|| ExtractError::invalid_row(&bucket.name, "row has no _value"))?;
    let mut value: Value = serde_json::from_str(payload).map_err(|e| {
        ExtractError::invalid_row(&bucket.name, format!("_value is not valid JSON: {}", e))
    })?;

    if let Value::Object(doc) = &mut value {
        apply_index_columns(bucket, row, doc);
    }

    check_vnode(row, &value)?;

    Ok(DocumentRecord {
        bucket: bucket.name.clone(),
        key: row.get("_key").map(str::to_string),
        value,
        id: row.get("_id").map(str::to_string),
        etag: row.get("_etag").map(str::to_string),
        mtime: row.get("_mtime").and_then(parse_leading_int),
        txn_snapshot: row.get("_txn_snap").map(str::to_string),
    })
}

fn apply_index_columns(bucket: &BucketConfig, row: &CopyRow, doc: &mut Map<String, Value>) {
    for index_key in &bucket.index_keys {
        // Array-valued properties are not index-backed.
        if matches!(doc.get(&index_key.key), Some(Value::Array(_))) {
            continue;
        }

        match row.get(&index_key.lc_key) {
            None => {
                doc.shift_remove(&index_key.key);
            }
            Some(column) => {
                doc.insert(index_key.key.clone(), Value::String(column.to_string()));
            }
        }
    }
}

fn check_vnode(row: &CopyRow, value: &Value) -> Result<()> {
    let Some(property) = value.get("vnode") else {
        return Ok(());
    };

    let column = row.get("_vnode").and_then(parse_leading_int);
    let from_value = match property {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    };

    match (column, from_value) {
        (Some(a), Some(b)) if a == b => Ok(()),
        _ => Err(ExtractError::Consistency {
            column: display_int(column),
            property: display_int(from_value),
        }),
    }
}

fn display_int(v: Option<i64>) -> String {
    v.map_or_else(|| "NaN".to_string(), |v| v.to_string())
}

/// Integer prefix of `text`: optional leading whitespace and sign, then at
/// least one digit. Trailing text is ignored.
pub fn parse_leading_int(text: &str) -> Option<i64> {
    let s = text.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
