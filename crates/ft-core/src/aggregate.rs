//! Per (date, exposure) aggregation of accepted and rejected frames.
//!
//! A scan is a single pass over the log. Every qualifying line is classified,
//! its records extracted, and each record folded into the table for its
//! classification. Totals travel in the returned [`ScanSummary`].

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::{
    DatePolicy, Exposure, ExtractError, ExtractedRecord, FRAMES_REJECTION_MARKER,
    LineClassification, classify_line, extract_records,
};

/// Buffer size for `BufReader` (64KB, acquisition logs run to tens of MB)
const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to open log file {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read line {line}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to extract records from line {line}")]
    Extract {
        line: usize,
        #[source]
        source: ExtractError,
    },
    #[error("exposure totals overflowed at line {line}")]
    TotalOverflow { line: usize },
}

/// A bucket total no longer fits in [`Exposure`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("bucket exposure total overflowed")]
pub struct BucketOverflow;

/// Bucket key. Orders by date, then exposure ascending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregationKey {
    pub date: String,
    pub exposure: Exposure,
}

/// Frame count and summed exposure for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationBucket {
    pub count: u64,
    pub total: Exposure,
}

/// Buckets keyed by (date, exposure), iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationTable {
    buckets: BTreeMap<AggregationKey, AggregationBucket>,
}

impl AggregationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one record into its bucket, creating the bucket if needed.
    ///
    /// On overflow the bucket is left unchanged.
    pub fn add(&mut self, record: ExtractedRecord) -> Result<(), BucketOverflow> {
        let bucket = self
            .buckets
            .entry(AggregationKey {
                date: record.date,
                exposure: record.exposure,
            })
            .or_default();
        bucket.total = bucket
            .total
            .checked_add(record.exposure)
            .ok_or(BucketOverflow)?;
        bucket.count += 1;
        Ok(())
    }

    pub fn get(&self, key: &AggregationKey) -> Option<&AggregationBucket> {
        self.buckets.get(key)
    }

    /// Buckets sorted by (date, exposure).
    pub fn iter(&self) -> impl Iterator<Item = (&AggregationKey, &AggregationBucket)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl<'a> IntoIterator for &'a AggregationTable {
    type Item = (&'a AggregationKey, &'a AggregationBucket);
    type IntoIter = std::collections::btree_map::Iter<'a, AggregationKey, AggregationBucket>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.iter()
    }
}

/// Line counts gathered during a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub lines_read: usize,
    pub accepted_lines: usize,
    pub rejected_lines: usize,
    /// Marker lines ending in neither `accepted` nor `rejected`.
    pub unclassified_lines: usize,
    /// Classified lines the extraction pattern found nothing in.
    pub unmatched_lines: usize,
}

/// Everything one scan produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub accepted: AggregationTable,
    pub rejected: AggregationTable,
    pub accepted_total: Exposure,
    pub rejected_total: Exposure,
    pub stats: ScanStats,
}

/// Lines split on `\n`, `\r\n` or a lone `\r`.
struct LogLines<R> {
    reader: R,
    buf: Vec<u8>,
    pending: VecDeque<String>,
}

impl<R: BufRead> LogLines<R> {
    const fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            pending: VecDeque::new(),
        }
    }
}

impl<R: BufRead> Iterator for LogLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }

            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            let chunk = match std::str::from_utf8(&self.buf) {
                Ok(chunk) => chunk,
                Err(e) => return Some(Err(io::Error::new(io::ErrorKind::InvalidData, e))),
            };
            let chunk = chunk.strip_suffix('\n').unwrap_or(chunk);
            let chunk = chunk.strip_suffix('\r').unwrap_or(chunk);
            self.pending.extend(chunk.split('\r').map(str::to_string));
        }
    }
}

/// Scans a log from any buffered reader.
pub fn process_reader<R: BufRead>(
    reader: R,
    policy: DatePolicy,
) -> Result<ScanSummary, ScanError> {
    let mut summary = ScanSummary::default();

    for (index, line_result) in LogLines::new(reader).enumerate() {
        let line_number = index + 1;
        let line = line_result.map_err(|source| ScanError::Read {
            line: line_number,
            source,
        })?;
        summary.stats.lines_read += 1;

        let (table, total) = match classify_line(&line) {
            LineClassification::Accepted => {
                summary.stats.accepted_lines += 1;
                (&mut summary.accepted, &mut summary.accepted_total)
            }
            LineClassification::Rejected => {
                summary.stats.rejected_lines += 1;
                (&mut summary.rejected, &mut summary.rejected_total)
            }
            LineClassification::Irrelevant => {
                if line.contains(FRAMES_REJECTION_MARKER) {
                    summary.stats.unclassified_lines += 1;
                }
                continue;
            }
        };

        let records = extract_records(&line, policy).map_err(|source| ScanError::Extract {
            line: line_number,
            source,
        })?;
        if records.is_empty() {
            summary.stats.unmatched_lines += 1;
            tracing::trace!(line = line_number, "marker line matched no records");
        }
        let overflow = || ScanError::TotalOverflow { line: line_number };
        for record in records {
            *total = total.checked_add(record.exposure).ok_or_else(overflow)?;
            table.add(record).map_err(|BucketOverflow| overflow())?;
        }
    }

    Ok(summary)
}

/// Scans the log file at `path`.
pub fn process_file(path: &Path, policy: DatePolicy) -> Result<ScanSummary, ScanError> {
    let file = File::open(path).map_err(|source| ScanError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let summary = process_reader(BufReader::with_capacity(BUFFER_SIZE, file), policy)?;

    tracing::debug!(
        path = %path.display(),
        %policy,
        lines = summary.stats.lines_read,
        accepted_lines = summary.stats.accepted_lines,
        rejected_lines = summary.stats.rejected_lines,
        unclassified_lines = summary.stats.unclassified_lines,
        unmatched_lines = summary.stats.unmatched_lines,
        accepted_buckets = summary.accepted.len(),
        rejected_buckets = summary.rejected.len(),
        "scanned log file"
    );

    Ok(summary)
}
