//! IO helpers for CLI operations.
//!
//! Provides summary export (summary.jsonl, summary.csv).

pub mod export_writer;

pub use export_writer::{
    encode_csv, ExportWriter, OutputWriterError, WrittenFiles, CSV_HEADER, SUMMARY_CSV,
    SUMMARY_JSONL,
};
