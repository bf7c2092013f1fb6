//! Events produced by tokenizing a dump.

use std::sync::Arc;

/// One structural event from a `pg_dump` plain-text stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DumpEvent {
    /// A `COPY ... FROM stdin;` statement opened a data section.
    SectionStart {
        /// Schema qualifier, if the statement had one.
        schema: Option<String>,
        /// Unqualified table name.
        table: String,
        /// Column names in row order.
        columns: Arc<[String]>,
    },

    /// One data row of the open section.
    Row(CopyRow),

    /// The `\.` terminator closed the open section.
    SectionEnd {
        /// Table whose section ended.
        table: String,
    },
}

/// A single COPY data row.
///
/// Values are kept as the text the dump carried; `None` is the `\N` null
/// marker. Fields that were not valid UTF-8 are stored lossily and the
/// first such column is remembered, so a consumer can reject the row.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyRow {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
    invalid_utf8: Option<usize>,
}

impl CopyRow {
    /// Create a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<Option<String>>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            columns,
            values,
            invalid_utf8: None,
        }
    }

    /// Create a row from decoded field bytes.
    pub fn from_raw(columns: Arc<[String]>, raw: Vec<Option<Vec<u8>>>) -> Self {
        debug_assert_eq!(columns.len(), raw.len());
        let mut invalid_utf8 = None;
        let values = raw
            .into_iter()
            .enumerate()
            .map(|(i, field)| {
                field.map(|bytes| match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        invalid_utf8.get_or_insert(i);
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                })
            })
            .collect();

        Self {
            columns,
            values,
            invalid_utf8,
        }
    }

    /// Name of the first column whose bytes were not valid UTF-8.
    pub fn invalid_utf8_column(&self) -> Option<&str> {
        self.invalid_utf8.map(|i| self.columns[i].as_str())
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Option<String>>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.map(Into::into)))
            .unzip();
        Self::new(columns.into(), values)
    }

    /// Value of `column`; `None` when the column is absent or null.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values[i].as_deref())
    }

    /// Whether the section declared `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Column names in row order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw values in row order.
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }
}
