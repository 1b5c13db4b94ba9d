//! Pure formatting collaborators and the [`Summarizer`].
//!
//! Everything here is stateless: formatters take their configuration by
//! reference and allocate fresh output, so any number of workers can call
//! them concurrently without coordination.

use crate::{RawRecord, RenderRecord};
use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Marker appended to truncated summaries.
pub const ELLIPSIS: &str = "...";

/// Length (in chars) of [`ELLIPSIS`].
pub const ELLIPSIS_LEN: usize = 3;

/// Default maximum summary length, in chars, before the ellipsis.
pub const DEFAULT_SUMMARY_MAX_LEN: usize = 120;

const TIMESTAMP_PATTERN: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Where the currency symbol sits relative to the number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolPosition {
    /// `$1,234.00`
    Prefix,
    /// `1.234,00 €` (separated by a no-break space)
    Suffix,
}

/// Locale rules for rendering a monetary amount with two fraction digits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrencyStyle {
    pub symbol: String,
    pub position: SymbolPosition,
    pub decimal_separator: char,
    pub group_separator: char,
}

impl CurrencyStyle {
    /// German euro formatting: `1.369,63 €`.
    pub fn de_de() -> Self {
        Self {
            symbol: "€".to_string(),
            position: SymbolPosition::Suffix,
            decimal_separator: ',',
            group_separator: '.',
        }
    }

    /// US dollar formatting: `$1,369.63`.
    pub fn en_us() -> Self {
        Self {
            symbol: "$".to_string(),
            position: SymbolPosition::Prefix,
            decimal_separator: '.',
            group_separator: ',',
        }
    }

    /// Looks up a preset by locale tag (`de-DE`, `en-US`; case-insensitive,
    /// `_` accepted in place of `-`).
    pub fn from_locale(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().replace('_', "-").as_str() {
            "de-de" | "de" => Some(Self::de_de()),
            "en-us" | "en" => Some(Self::en_us()),
            _ => None,
        }
    }
}

impl Default for CurrencyStyle {
    fn default() -> Self {
        Self::de_de()
    }
}

/// Formatting rules shared by all workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatConfig {
    /// Offset applied to timestamps before rendering. UTC by default so output
    /// does not depend on the host's zone.
    pub utc_offset: FixedOffset,
    pub currency: CurrencyStyle,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            currency: CurrencyStyle::default(),
        }
    }
}

/// Renders epoch milliseconds as `yyyy-MM-dd HH:mm:ss.SSS` at `offset`.
///
/// Values outside chrono's representable range fall back to the raw number.
///
/// ```
/// use chrono::FixedOffset;
/// use sluice::format_timestamp;
///
/// let utc = FixedOffset::east_opt(0).unwrap();
/// assert_eq!(format_timestamp(1_700_000_000_123, utc), "2023-11-14 22:13:20.123");
/// ```
pub fn format_timestamp(epoch_millis: u64, offset: FixedOffset) -> String {
    i64::try_from(epoch_millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.with_timezone(&offset).format(TIMESTAMP_PATTERN).to_string())
        .unwrap_or_else(|| epoch_millis.to_string())
}

/// Renders `amount` with exactly two fraction digits, digit grouping and the
/// currency symbol of `style`. Non-finite amounts render as-is.
///
/// ```
/// use sluice::{CurrencyStyle, format_amount};
///
/// assert_eq!(format_amount(1369.63, &CurrencyStyle::en_us()), "$1,369.63");
/// assert_eq!(format_amount(1369.63, &CurrencyStyle::de_de()), "1.369,63\u{a0}€");
/// ```
pub fn format_amount(amount: f64, style: &CurrencyStyle) -> String {
    if !amount.is_finite() {
        return amount.to_string();
    }

    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut number = String::with_capacity(whole.len() + whole.len() / 3 + 4);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            number.push(style.group_separator);
        }
        number.push(digit);
    }
    number.push(style.decimal_separator);
    number.push_str(&format!("{fraction:02}"));

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    match style.position {
        SymbolPosition::Prefix => format!("{sign}{}{number}", style.symbol),
        SymbolPosition::Suffix => format!("{sign}{number}\u{a0}{}", style.symbol),
    }
}

/// Truncates `payload` to `max_len` chars and appends [`ELLIPSIS`]; payloads
/// that already fit are returned unchanged.
///
/// Lengths are counted in `char`s so multi-byte text is never split.
///
/// ```
/// use sluice::summarize;
///
/// assert_eq!(summarize("short", 10), "short");
/// assert_eq!(summarize("abcdefghij", 4), "abcd...");
/// ```
pub fn summarize(payload: &str, max_len: usize) -> String {
    match payload.char_indices().nth(max_len) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + ELLIPSIS.len());
            out.push_str(&payload[..cut]);
            out.push_str(ELLIPSIS);
            out
        }
        None => payload.to_string(),
    }
}

/// Converts [`RawRecord`]s into [`RenderRecord`]s.
///
/// Holds only immutable configuration; share it across workers behind an
/// `Arc`.
#[derive(Clone, Debug)]
pub struct Summarizer {
    format: FormatConfig,
    max_summary_len: usize,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new(FormatConfig::default(), DEFAULT_SUMMARY_MAX_LEN)
    }
}

impl Summarizer {
    pub const fn new(format: FormatConfig, max_summary_len: usize) -> Self {
        Self {
            format,
            max_summary_len,
        }
    }

    pub const fn max_summary_len(&self) -> usize {
        self.max_summary_len
    }

    /// Consumes a raw record and produces its display form.
    pub fn summarize_record(&self, raw: RawRecord) -> RenderRecord {
        RenderRecord {
            id: raw.id,
            timestamp_text: format_timestamp(raw.timestamp_millis, self.format.utc_offset),
            amount_text: format_amount(raw.amount, &self.format.currency),
            customer_text: raw.customer_key,
            summary_text: summarize(&raw.payload, self.max_summary_len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordGenerator;

    #[test]
    fn summarize_leaves_short_payloads_alone() {
        for payload in ["", "a", "exactly-ten", "ümläüt"] {
            let len = payload.chars().count();
            assert_eq!(summarize(payload, len), payload);
            assert_eq!(summarize(payload, len + 5), payload);
        }
    }

    #[test]
    fn summarize_bounds_long_payloads() {
        let payload = "x".repeat(500);
        for max in [0, 1, 7, 120, 499] {
            let out = summarize(&payload, max);
            assert_eq!(out.chars().count(), max + ELLIPSIS_LEN);
            assert!(out.ends_with(ELLIPSIS));
        }
    }

    #[test]
    fn summarize_respects_char_boundaries() {
        assert_eq!(summarize("ééééé", 2), "éé...");
    }

    #[test]
    fn amount_grouping() {
        let us = CurrencyStyle::en_us();
        assert_eq!(format_amount(0.0, &us), "$0.00");
        assert_eq!(format_amount(999.999, &us), "$1,000.00");
        assert_eq!(format_amount(1_234_567.891, &us), "$1,234,567.89");
        assert_eq!(format_amount(-12.5, &us), "-$12.50");
        assert_eq!(format_amount(-0.001, &us), "$0.00");

        let de = CurrencyStyle::de_de();
        assert_eq!(format_amount(1_234_567.891, &de), "1.234.567,89\u{a0}€");
        assert_eq!(format_amount(13.7, &de), "13,70\u{a0}€");
    }

    #[test]
    fn locale_lookup() {
        assert_eq!(CurrencyStyle::from_locale("de_DE"), Some(CurrencyStyle::de_de()));
        assert_eq!(CurrencyStyle::from_locale("EN-us"), Some(CurrencyStyle::en_us()));
        assert_eq!(CurrencyStyle::from_locale("fr-FR"), None);
    }

    #[test]
    fn timestamp_applies_offset() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(format_timestamp(0, plus_two), "1970-01-01 02:00:00.000");
        assert_eq!(format_timestamp(u64::MAX, plus_two), u64::MAX.to_string());
    }

    #[test]
    fn summarize_record_formats_every_field() {
        let raw = RecordGenerator::new(1_700_000_000_123).generate(1);
        let payload = raw.payload.clone();
        let render = Summarizer::default().summarize_record(raw);

        assert_eq!(render.id, 1);
        assert_eq!(render.timestamp_text, "2023-11-14 22:13:20.122");
        assert_eq!(render.amount_text, "1,37\u{a0}€");
        assert_eq!(render.customer_text, "Customer-1");
        assert_eq!(render.summary_text, summarize(&payload, DEFAULT_SUMMARY_MAX_LEN));
        assert!(render.summary_text.chars().count() <= DEFAULT_SUMMARY_MAX_LEN + ELLIPSIS_LEN);
    }
}
