//! Streaming tokenizer turning `pg_dump` plain-text output into [`DumpEvent`]s.
//!
//! Outside of a data section the input is scanned as SQL; a
//! `COPY ... FROM stdin;` statement switches to line-oriented COPY mode
//! until the `\.` terminator.

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::Arc;

use tracing::debug;

use super::copy::{self, END_OF_DATA};
use super::event::{CopyRow, DumpEvent};
use super::sql::{parse_copy_statement, StatementScanner};
use crate::error::{ExtractError, Result};

/// The COPY section currently being read.
#[derive(Debug)]
struct OpenSection {
    table: String,
    columns: Arc<[String]>,
    rows: u64,
}

/// Lazy, finite, non-restartable event iterator over a dump.
///
/// After the first error the iterator is exhausted.
pub struct DumpTokenizer<R> {
    reader: R,
    line: Vec<u8>,
    line_no: u64,
    scanner: StatementScanner,
    statements: VecDeque<String>,
    section: Option<OpenSection>,
    done: bool,
}

impl<R: BufRead> DumpTokenizer<R> {
    /// Create a tokenizer over decompressed dump text.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(8 * 1024),
            line_no: 0,
            scanner: StatementScanner::new(),
            statements: VecDeque::new(),
            section: None,
            done: false,
        }
    }

    /// Number of input lines consumed so far.
    pub fn line_number(&self) -> u64 {
        self.line_no
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        Ok(true)
    }

    fn step(&mut self) -> Result<Option<DumpEvent>> {
        loop {
            while let Some(stmt) = self.statements.pop_front() {
                if let Some(header) = parse_copy_statement(&stmt)? {
                    // The data block starts on the next line.
                    self.statements.clear();
                    self.scanner.reset();

                    debug!(
                        "COPY [{}] ({} columns) at line {}",
                        header.table,
                        header.columns.len(),
                        self.line_no
                    );
                    self.section = Some(OpenSection {
                        table: header.table.clone(),
                        columns: header.columns.clone(),
                        rows: 0,
                    });
                    return Ok(Some(DumpEvent::SectionStart {
                        schema: header.schema,
                        table: header.table,
                        columns: header.columns,
                    }));
                }
            }

            if !self.read_line()? {
                if let Some(section) = &self.section {
                    return Err(ExtractError::structural(format!(
                        "dump ended inside COPY data for table \"{}\"",
                        section.table
                    )));
                }
                if let Some(what) = self.scanner.unterminated() {
                    return Err(ExtractError::structural(format!(
                        "dump ended inside {}",
                        what
                    )));
                }
                return Ok(None);
            }

            let line_no = self.line_no;

            if let Some(section) = self.section.as_mut() {
                let data = self.line.strip_suffix(b"\n").unwrap_or(self.line.as_slice());

                if data == END_OF_DATA.as_bytes() {
                    debug!("COPY END [{}] ({} rows)", section.table, section.rows);
                    let table = std::mem::take(&mut section.table);
                    self.section = None;
                    return Ok(Some(DumpEvent::SectionEnd { table }));
                }

                // Encoding is checked by whoever reads the row; sections
                // nobody reads may carry any bytes.
                let values = copy::decode_row(data, section.columns.len()).map_err(|msg| {
                    ExtractError::structural(format!(
                        "line {}: table \"{}\": {}",
                        line_no, section.table, msg
                    ))
                })?;
                section.rows += 1;
                return Ok(Some(DumpEvent::Row(CopyRow::from_raw(
                    section.columns.clone(),
                    values,
                ))));
            }

            let text = String::from_utf8_lossy(&self.line);
            self.scanner.feed(&text, &mut self.statements);
        }
    }
}

impl<R: BufRead> Iterator for DumpTokenizer<R> {
    type Item = Result<DumpEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.step() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DumpBuilder, NULL};
    use std::io::Cursor;

    fn events(text: &str) -> Vec<Result<DumpEvent>> {
        DumpTokenizer::new(Cursor::new(text.as_bytes().to_vec())).collect()
    }

    fn ok_events(text: &str) -> Vec<DumpEvent> {
        events(text).into_iter().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn test_emits_section_row_and_end() {
        let dump = DumpBuilder::new()
            .copy("foo", &["_id", "_key"], &[&["1", "a"], &["2", NULL]])
            .build();

        let events = ok_events(&dump);
        assert_eq!(events.len(), 4);

        match &events[0] {
            DumpEvent::SectionStart { schema, table, columns } => {
                assert_eq!(schema.as_deref(), Some("public"));
                assert_eq!(table, "foo");
                assert_eq!(&**columns, &["_id", "_key"]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &events[2] {
            DumpEvent::Row(row) => {
                assert_eq!(row.get("_id"), Some("2"));
                assert_eq!(row.get("_key"), None);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            events[3],
            DumpEvent::SectionEnd {
                table: "foo".to_string()
            }
        );
    }

    #[test]
    fn test_skips_ddl_and_functions() {
        let dump = DumpBuilder::new()
            .sql("CREATE FUNCTION public.touch() RETURNS trigger\n    LANGUAGE plpgsql\n    AS $$\nBEGIN\n    NEW._mtime := 1;\n    RETURN NEW;\nEND;\n$$;")
            .sql("CREATE TABLE public.foo (\n    _id integer NOT NULL,\n    _key text NOT NULL\n);")
            .copy("foo", &["_id", "_key"], &[&["1", "a"]])
            .build();

        let events = ok_events(&dump);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], DumpEvent::SectionStart { table, .. } if table == "foo"));
    }

    #[test]
    fn test_multiple_sections_in_order() {
        let dump = DumpBuilder::new()
            .copy("a", &["x"], &[&["1"]])
            .copy("b", &["x"], &[])
            .copy("c", &["x"], &[&["2"], &["3"]])
            .build();

        let tables: Vec<String> = ok_events(&dump)
            .into_iter()
            .filter_map(|e| match e {
                DumpEvent::SectionStart { table, .. } => Some(table),
                _ => None,
            })
            .collect();
        assert_eq!(tables, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_row_values_are_unescaped() {
        let dump = DumpBuilder::new()
            .copy("foo", &["_value"], &[&[r#"{"a":"tab\\there"}"#]])
            .build();

        let events = ok_events(&dump);
        match &events[1] {
            DumpEvent::Row(row) => assert_eq!(row.get("_value"), Some(r#"{"a":"tab\there"}"#)),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_non_utf8_bytes_do_not_stop_the_scan() {
        let mut dump = b"-- caf\xe9\nCOMMENT ON TABLE public.legacy IS 'caf\xe9';\n".to_vec();
        dump.extend_from_slice(b"COPY public.legacy (name) FROM stdin;\ncaf\xe9\n\\.\n");
        dump.extend_from_slice(b"COPY public.foo (a) FROM stdin;\nok\n\\.\n");

        let events: Vec<DumpEvent> = DumpTokenizer::new(Cursor::new(dump))
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(events.len(), 6);
        match &events[1] {
            DumpEvent::Row(row) => assert_eq!(row.invalid_utf8_column(), Some("name")),
            other => panic!("unexpected event {:?}", other),
        }
        match &events[4] {
            DumpEvent::Row(row) => {
                assert_eq!(row.get("a"), Some("ok"));
                assert_eq!(row.invalid_utf8_column(), None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_truncated_copy_is_structural() {
        let dump = "COPY public.foo (a) FROM stdin;\n1\n";
        let events = events(dump);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], Err(ExtractError::Structural(_))));
    }

    #[test]
    fn test_wrong_column_count_is_structural() {
        let dump = "COPY public.foo (a, b) FROM stdin;\n1\n\\.\n";
        let events = events(dump);
        assert_eq!(events.len(), 2);
        match &events[1] {
            Err(ExtractError::Structural(msg)) => assert!(msg.contains("line 2")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_iterator_is_fused_after_error() {
        let dump = "SELECT 'unterminated\n";
        let mut tokenizer = DumpTokenizer::new(Cursor::new(dump.as_bytes().to_vec()));
        assert!(matches!(tokenizer.next(), Some(Err(ExtractError::Structural(_)))));
        assert!(tokenizer.next().is_none());
    }

    #[test]
    fn test_empty_input_has_no_events() {
        assert!(events("").is_empty());
        assert_eq!(
            DumpTokenizer::new(Cursor::new(b"-- nothing\n".to_vec())).line_number(),
            0
        );
    }
}
