//! Core domain logic for frametime.
//!
//! This crate contains:
//! - Record extraction: the `[Frames rejection]` pattern and date policy
//! - Line classification: accepted, rejected or irrelevant
//! - Aggregation: per (date, exposure) buckets built in one pass over a log

mod aggregate;
pub mod record;

pub use aggregate::{
    AggregationBucket, AggregationKey, AggregationTable, BucketOverflow, ScanError, ScanStats,
    ScanSummary, process_file, process_reader,
};
pub use record::{
    DatePolicy, Exposure, ExtractError, ExtractedRecord, FRAMES_REJECTION_MARKER,
    LineClassification, UnknownDatePolicy, classify_line, extract_records,
};
