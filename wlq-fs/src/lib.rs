//! Filesystem abstraction and record sink for wlq.
//!
//! This crate provides:
//! - Filesystem trait for atomic writes and appends
//! - Hourly record file naming
//! - BufferedRecordWriter, the batching sink the sampler writes records to

pub mod sink;
pub mod writer;

pub use sink::{BufferedRecordWriter, RecordSink, SinkConfig, SinkError, SinkStats};
pub use writer::{records_filename, Filesystem, FsError, MockFilesystem, RealFilesystem};
