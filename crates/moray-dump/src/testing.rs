//! Dump fixtures shared by unit tests.

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

/// COPY null marker, for building rows.
pub const NULL: &str = "\\N";

/// Columns of the Moray bucket configuration table.
pub const CONFIG_COLUMNS: &[&str] = &[
    "name",
    "index",
    "pre",
    "post",
    "options",
    "mtime",
    "reindex_active",
];

/// Builds `pg_dump`-style plain-text dumps.
pub struct DumpBuilder {
    text: String,
}

impl DumpBuilder {
    pub fn new() -> Self {
        let mut text = String::new();
        text.push_str("--\n-- PostgreSQL database dump\n--\n\n");
        text.push_str("SET statement_timeout = 0;\n");
        text.push_str("SET client_encoding = 'UTF8';\n");
        text.push_str("SET standard_conforming_strings = on;\n\n");
        Self { text }
    }

    pub fn sql(mut self, stmt: &str) -> Self {
        self.text.push_str(stmt);
        self.text.push_str("\n\n");
        self
    }

    pub fn copy(mut self, table: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        self.text.push_str(&format!(
            "COPY public.{} ({}) FROM stdin;\n",
            table,
            columns.join(", ")
        ));
        for row in rows {
            self.text.push_str(&row.join("\t"));
            self.text.push('\n');
        }
        self.text.push_str("\\.\n\n");
        self
    }

    /// Add a `buckets_config` section with one row per `(name, index)`.
    pub fn buckets(self, buckets: &[(&str, &str)]) -> Self {
        let rows: Vec<[&str; 7]> = buckets
            .iter()
            .map(|(name, index)| {
                [*name, *index, "[]", "[]", "{}", "2017-03-09 19:10:48.123456", NULL]
            })
            .collect();
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        self.copy("buckets_config", CONFIG_COLUMNS, &rows)
    }

    pub fn build(self) -> String {
        self.text
    }

    /// Write the dump gzip-compressed to `path`.
    pub fn write_gz(self, path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(self.text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }
}
