//! Reading `pg_dump` plain-text output as a stream of table sections.
//!
//! - [`DumpTokenizer`]: synchronous iterator over decompressed dump text
//! - [`DumpSource`]: file-backed [`EventSource`] running the tokenizer on a
//!   blocking worker behind a bounded channel
//! - [`DumpEvent`] / [`CopyRow`]: what the tokenizer produces

pub mod copy;
mod event;
pub mod sql;
mod source;
mod tokenizer;

pub use event::{CopyRow, DumpEvent};
pub use source::{DumpSource, EventSource};
pub use tokenizer::DumpTokenizer;
