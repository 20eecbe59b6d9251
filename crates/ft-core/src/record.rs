//! Record extraction and line classification for `[Frames rejection]` log lines.
//!
//! Acquisition software writes one line per evaluated frame. Relevant lines
//! carry the marker, a date, the frame's exposure encoded between underscores
//! in the file name, and end in either `accepted` or `rejected`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal tag identifying frame rejection lines.
pub const FRAMES_REJECTION_MARKER: &str = "[Frames rejection]";

/// Group 1 is the date, group 2 the exposure in seconds with two decimals.
static RECORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Frames rejection\] (\d{4}-\d{2}-\d{2}).*?-\d+\.\d{2}.*?_(\d+\.\d{2})s?_")
        .unwrap()
});

/// A single Unicode decimal digit, the set `\d` matches in [`RECORD_RE`].
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d$").unwrap());

/// Hours subtracted from a captured date under [`DatePolicy::ObservingNight`].
const OBSERVING_NIGHT_SHIFT_HOURS: i64 = 12;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors raised while turning a matched line into records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The captured date is not a real calendar date.
    #[error("invalid date in log line: {value}")]
    InvalidDate { value: String },

    /// The captured exposure is larger than `u64` hundredths of a second.
    #[error("exposure too large: {value}")]
    ExposureOverflow { value: String },
}

/// Error returned when parsing an unknown date policy name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown date policy: {0} (expected `verbatim` or `observing-night`)")]
pub struct UnknownDatePolicy(pub String);

/// How the date captured from a log line maps to the reported date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatePolicy {
    /// Report the captured date unchanged.
    #[default]
    Verbatim,
    /// Shift the captured date back 12 hours so frames taken after local
    /// midnight count toward the night that started the previous evening.
    ObservingNight,
}

impl DatePolicy {
    /// Name used on the command line and in config files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verbatim => "verbatim",
            Self::ObservingNight => "observing-night",
        }
    }

    /// Applies the policy to a captured `YYYY-MM-DD` date.
    pub fn apply(self, captured: &str) -> Result<String, ExtractError> {
        match self {
            Self::Verbatim => Ok(captured.to_string()),
            Self::ObservingNight => {
                let invalid = || ExtractError::InvalidDate {
                    value: captured.to_string(),
                };
                let ascii: String = captured
                    .chars()
                    .map(|c| {
                        decimal_digit_value(c)
                            .and_then(|d| char::from_digit(d, 10))
                            .unwrap_or(c)
                    })
                    .collect();
                let date = NaiveDate::parse_from_str(&ascii, DATE_FORMAT).map_err(|_| invalid())?;
                let shifted = date
                    .and_time(NaiveTime::MIN)
                    .checked_sub_signed(Duration::hours(OBSERVING_NIGHT_SHIFT_HOURS))
                    .ok_or_else(invalid)?;
                Ok(shifted.format(DATE_FORMAT).to_string())
            }
        }
    }
}

impl fmt::Display for DatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatePolicy {
    type Err = UnknownDatePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verbatim" => Ok(Self::Verbatim),
            "observing-night" => Ok(Self::ObservingNight),
            _ => Err(UnknownDatePolicy(s.to_string())),
        }
    }
}

/// Exposure duration held as exact hundredths of a second.
///
/// The log encodes exposures with exactly two decimals, so this is lossless
/// and gives a totally ordered, hashable key with exact sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Exposure(u64);

impl Exposure {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// Parses a captured `\d+\.\d{2}` value, digits in any Unicode script.
    fn parse_captured(value: &str) -> Result<Self, ExtractError> {
        let overflow = || ExtractError::ExposureOverflow {
            value: value.to_string(),
        };
        // Exactly two fraction digits, so dropping the point yields hundredths
        value
            .chars()
            .filter(|&c| c != '.')
            .filter_map(decimal_digit_value)
            .try_fold(0_u64, |acc, digit| {
                acc.checked_mul(10)
                    .and_then(|acc| acc.checked_add(u64::from(digit)))
            })
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Sum of two exposures, `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Whole seconds, rounding half to even.
    #[must_use]
    pub const fn round_secs(self) -> u64 {
        let secs = self.0 / 100;
        let rem = self.0 % 100;
        if rem > 50 || (rem == 50 && secs % 2 == 1) {
            secs + 1
        } else {
            secs
        }
    }
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0; 4];
    DIGIT_RE.is_match(c.encode_utf8(&mut buf))
}

/// Value of a Unicode decimal digit (general category Nd).
///
/// Nd digits come in contiguous runs of whole 0..=9 blocks, so the value is
/// the offset from the start of the run, modulo ten.
fn decimal_digit_value(c: char) -> Option<u32> {
    if let Some(digit) = c.to_digit(10) {
        return Some(digit);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut run_start = u32::from(c);
    while let Some(prev) = run_start.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        run_start -= 1;
    }
    Some((u32::from(c) - run_start) % 10)
}

/// One (date, exposure) pair pulled from a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    /// Reported date, `YYYY-MM-DD`, after the date policy is applied.
    pub date: String,
    pub exposure: Exposure,
}

/// Outcome of inspecting a single log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClassification {
    Accepted,
    Rejected,
    Irrelevant,
}

/// Classifies a line by marker and trailing word.
///
/// Marker lines ending in neither `accepted` nor `rejected` are irrelevant.
pub fn classify_line(line: &str) -> LineClassification {
    if !line.contains(FRAMES_REJECTION_MARKER) {
        return LineClassification::Irrelevant;
    }
    let trimmed = line.trim_end();
    if trimmed.ends_with("accepted") {
        LineClassification::Accepted
    } else if trimmed.ends_with("rejected") {
        LineClassification::Rejected
    } else {
        LineClassification::Irrelevant
    }
}

/// Extracts every non-overlapping record from a line.
///
/// Lines the pattern does not match yield an empty vector.
pub fn extract_records(
    line: &str,
    policy: DatePolicy,
) -> Result<Vec<ExtractedRecord>, ExtractError> {
    RECORD_RE
        .captures_iter(line)
        .map(|caps| {
            let exposure = Exposure::parse_captured(&caps[2])?;
            Ok(ExtractedRecord {
                date: policy.apply(&caps[1])?,
                exposure,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, hundredths: u64) -> ExtractedRecord {
        ExtractedRecord {
            date: date.to_string(),
            exposure: Exposure::from_hundredths(hundredths),
        }
    }

    // ========== Classification ==========

    #[test]
    fn test_line_without_marker_is_irrelevant() {
        let line = "2024-03-10 22:01:03 [Guiding] settled accepted";
        assert_eq!(classify_line(line), LineClassification::Irrelevant);
        assert!(extract_records(line, DatePolicy::Verbatim).unwrap().is_empty());
    }

    #[test]
    fn test_classify_accepted_and_rejected() {
        assert_eq!(
            classify_line("[Frames rejection] 2024-03-10 frame accepted"),
            LineClassification::Accepted
        );
        assert_eq!(
            classify_line("[Frames rejection] 2024-03-10 frame rejected"),
            LineClassification::Rejected
        );
    }

    #[test]
    fn test_classify_ignores_trailing_whitespace() {
        assert_eq!(
            classify_line("[Frames rejection] 2024-03-10 frame accepted  \r\n"),
            LineClassification::Accepted
        );
    }

    #[test]
    fn test_classify_unknown_trailing_word_is_irrelevant() {
        assert_eq!(
            classify_line("[Frames rejection] 2024-03-10 frame pending"),
            LineClassification::Irrelevant
        );
        // The word must be at the end, not merely present
        assert_eq!(
            classify_line("[Frames rejection] accepted by filter: none"),
            LineClassification::Irrelevant
        );
    }

    // ========== Extraction ==========

    #[test]
    fn test_extract_single_record() {
        let line = "[Frames rejection] 2024-03-10_foo_-12.34_bar_5.00s_x accepted";
        let records = extract_records(line, DatePolicy::Verbatim).unwrap();
        assert_eq!(records, vec![record("2024-03-10", 500)]);
        assert_eq!(classify_line(line), LineClassification::Accepted);
    }

    #[test]
    fn test_extract_realistic_line() {
        let line = "2024-03-10 23:14:55 [Frames rejection] 2024-03-10 Light_M42_-10.00C_Ha_300.00s_0012.fits: FWHM 2.1 accepted";
        let records = extract_records(line, DatePolicy::Verbatim).unwrap();
        assert_eq!(records, vec![record("2024-03-10", 30_000)]);
    }

    #[test]
    fn test_extract_without_seconds_suffix() {
        let line = "[Frames rejection] 2024-03-10 Light_-5.00C_120.50_0001 rejected";
        let records = extract_records(line, DatePolicy::Verbatim).unwrap();
        assert_eq!(records, vec![record("2024-03-10", 12_050)]);
    }

    #[test]
    fn test_extract_multiple_matches_per_line() {
        let line = "[Frames rejection] 2024-03-10 a_-1.00_60.00s_ \
                    [Frames rejection] 2024-03-11 b_-2.00_30.00s_ accepted";
        let records = extract_records(line, DatePolicy::Verbatim).unwrap();
        assert_eq!(
            records,
            vec![record("2024-03-10", 6000), record("2024-03-11", 3000)]
        );
    }

    #[test]
    fn test_extract_marker_without_pattern_yields_nothing() {
        let line = "[Frames rejection] statistics computed accepted";
        assert!(extract_records(line, DatePolicy::Verbatim).unwrap().is_empty());
    }

    #[test]
    fn test_extract_requires_signed_number_before_exposure() {
        // No "-N.NN" between the date and the exposure
        let line = "[Frames rejection] 2024-03-10 Light_300.00s_0001 accepted";
        assert!(extract_records(line, DatePolicy::Verbatim).unwrap().is_empty());
    }

    #[test]
    fn test_extract_exposure_overflow_is_error() {
        let line = "[Frames rejection] 2024-03-10 x_-1.00_99999999999999999999.00s_ accepted";
        let err = extract_records(line, DatePolicy::Verbatim).unwrap_err();
        assert!(matches!(err, ExtractError::ExposureOverflow { .. }));
        assert!(err.to_string().starts_with("exposure too large"));
    }

    #[test]
    fn test_extract_exposure_at_u64_limit() {
        let line = "[Frames rejection] 2024-03-10 x_-1.00_184467440737095516.15s_ accepted";
        let records = extract_records(line, DatePolicy::Verbatim).unwrap();
        assert_eq!(records, vec![record("2024-03-10", u64::MAX)]);
    }

    #[test]
    fn test_extract_non_ascii_digits_in_exposure() {
        // Arabic-Indic "30.00"
        let line = "[Frames rejection] 2024-03-10 x_-1.00_\u{663}\u{660}.00s_ accepted";
        let records = extract_records(line, DatePolicy::Verbatim).unwrap();
        assert_eq!(records, vec![record("2024-03-10", 3000)]);

        // Fullwidth "120.50"
        let line = "[Frames rejection] 2024-03-10 x_-1.00_\u{ff11}\u{ff12}\u{ff10}.\u{ff15}\u{ff10}_ rejected";
        let records = extract_records(line, DatePolicy::Verbatim).unwrap();
        assert_eq!(records, vec![record("2024-03-10", 12_050)]);
    }

    #[test]
    fn test_decimal_digit_value_across_scripts() {
        assert_eq!(decimal_digit_value('7'), Some(7));
        assert_eq!(decimal_digit_value('\u{669}'), Some(9)); // ARABIC-INDIC NINE
        assert_eq!(decimal_digit_value('\u{96a}'), Some(4)); // DEVANAGARI FOUR
        // Mathematical digits are five back-to-back 0..=9 blocks
        assert_eq!(decimal_digit_value('\u{1d7ce}'), Some(0));
        assert_eq!(decimal_digit_value('\u{1d7e5}'), Some(3));
        assert_eq!(decimal_digit_value('\u{1d7ff}'), Some(9));
        assert_eq!(decimal_digit_value('x'), None);
        assert_eq!(decimal_digit_value('\u{2155}'), None); // VULGAR FRACTION ONE FIFTH
    }

    // ========== Date Policy ==========

    #[test]
    fn test_verbatim_keeps_invalid_calendar_date() {
        assert_eq!(DatePolicy::Verbatim.apply("2024-13-40").unwrap(), "2024-13-40");
    }

    #[test]
    fn test_observing_night_shifts_to_previous_day() {
        assert_eq!(
            DatePolicy::ObservingNight.apply("2024-03-10").unwrap(),
            "2024-03-09"
        );
        assert_eq!(
            DatePolicy::ObservingNight.apply("2024-03-01").unwrap(),
            "2024-02-29"
        );
        assert_eq!(
            DatePolicy::ObservingNight.apply("2025-01-01").unwrap(),
            "2024-12-31"
        );
    }

    #[test]
    fn test_observing_night_rejects_invalid_date() {
        let err = DatePolicy::ObservingNight.apply("2024-02-30").unwrap_err();
        assert_eq!(
            err,
            ExtractError::InvalidDate {
                value: "2024-02-30".to_string()
            }
        );
    }

    #[test]
    fn test_observing_night_reads_non_ascii_date_digits() {
        // Fullwidth "2024-03-10"
        let captured = "\u{ff12}\u{ff10}\u{ff12}\u{ff14}-\u{ff10}\u{ff13}-\u{ff11}\u{ff10}";
        assert_eq!(DatePolicy::ObservingNight.apply(captured).unwrap(), "2024-03-09");
        assert_eq!(DatePolicy::Verbatim.apply(captured).unwrap(), captured);
    }

    #[test]
    fn test_extract_with_observing_night() {
        let line = "[Frames rejection] 2024-03-10_foo_-12.34_bar_5.00s_x accepted";
        let records = extract_records(line, DatePolicy::ObservingNight).unwrap();
        assert_eq!(records, vec![record("2024-03-09", 500)]);
    }

    #[test]
    fn test_date_policy_round_trips_through_str() {
        for policy in [DatePolicy::Verbatim, DatePolicy::ObservingNight] {
            assert_eq!(policy.as_str().parse::<DatePolicy>().unwrap(), policy);
        }
        assert!("nightly".parse::<DatePolicy>().is_err());
    }

    // ========== Exposure ==========

    #[test]
    fn test_exposure_display_and_secs() {
        let exposure = Exposure::from_hundredths(12_040);
        assert_eq!(exposure.to_string(), "120.40");
        assert!((exposure.as_secs_f64() - 120.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exposure_checked_add() {
        let a = Exposure::from_hundredths(3000);
        assert_eq!(a.checked_add(a), Some(Exposure::from_hundredths(6000)));
        assert_eq!(Exposure::from_hundredths(u64::MAX).checked_add(a), None);
    }

    #[test]
    fn test_exposure_round_secs_half_to_even() {
        assert_eq!(Exposure::from_hundredths(36_120).round_secs(), 361);
        assert_eq!(Exposure::from_hundredths(36_151).round_secs(), 362);
        assert_eq!(Exposure::from_hundredths(250).round_secs(), 2);
        assert_eq!(Exposure::from_hundredths(350).round_secs(), 4);
        assert_eq!(Exposure::ZERO.round_secs(), 0);
    }
}
