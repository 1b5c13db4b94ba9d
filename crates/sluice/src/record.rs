//! Record types flowing through the bridge.
//!
//! A [`RawRecord`] is produced by the [`RecordGenerator`] on a worker, handed
//! by value to the [`Summarizer`](crate::Summarizer), and discarded once the
//! display-ready [`RenderRecord`] exists. Neither type is mutated after
//! construction.

use std::fmt::Write as _;

/// Tail appended to every generated payload so payloads exceed the default
/// summary width.
const PAYLOAD_TAIL: &str = "lorem_ipsum_dolor_sit_amet_consectetur_adipiscing_elit_\
                            sed_do_eiusmod_tempor_incididunt_ut_labore_et_dolore_magna_aliqua";

/// Window (in ms) over which generated timestamps are spread backward from the
/// generator's base time.
const TIMESTAMP_SPREAD_MS: u64 = 10_000;

/// Number of distinct customers generated records cycle through.
const CUSTOMER_KEYS: u64 = 500;

/// A synthetic source row before any formatting.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecord {
    pub id: u64,
    pub timestamp_millis: u64,
    pub amount: f64,
    pub customer_key: String,
    pub payload: String,
}

/// A display-ready row. Every field is already formatted text except `id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderRecord {
    pub id: u64,
    pub timestamp_text: String,
    pub amount_text: String,
    pub customer_text: String,
    pub summary_text: String,
}

/// Deterministic source of [`RawRecord`]s.
///
/// Output depends only on `base_millis` and the requested index, so the same
/// generator produces identical records on any thread and in any order.
///
/// # Example
///
/// ```
/// use sluice::RecordGenerator;
///
/// let generator = RecordGenerator::new(1_000_000);
/// let record = generator.generate(7);
/// assert_eq!(record.id, 7);
/// assert_eq!(record.customer_key, "Customer-7");
/// assert_eq!(record.timestamp_millis, 1_000_000 - 7);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct RecordGenerator {
    base_millis: u64,
}

impl RecordGenerator {
    /// Creates a generator whose timestamps are anchored at `base_millis`
    /// (epoch milliseconds).
    pub const fn new(base_millis: u64) -> Self {
        Self { base_millis }
    }

    pub const fn base_millis(&self) -> u64 {
        self.base_millis
    }

    /// Builds the record for index `id`.
    pub fn generate(&self, id: u64) -> RawRecord {
        let token = payload_token(id);
        let mut payload = String::with_capacity(32 + token.len() + PAYLOAD_TAIL.len());
        let _ = write!(payload, "payload_{id}_{token}_{PAYLOAD_TAIL}");

        RawRecord {
            id,
            timestamp_millis: self.base_millis.saturating_sub(id % TIMESTAMP_SPREAD_MS),
            amount: (id % 1000) as f64 * 1.37,
            customer_key: format!("Customer-{}", id % CUSTOMER_KEYS),
            payload,
        }
    }
}

/// SplitMix64 finalizer; spreads consecutive ids over the whole `u64` range.
const fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A UUID-shaped hex token derived from `id`.
fn payload_token(id: u64) -> String {
    let hi = mix64(id);
    let lo = mix64(id ^ 0xA5A5_A5A5_A5A5_A5A5);
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        hi >> 32,
        (hi >> 16) & 0xFFFF,
        hi & 0xFFFF,
        lo >> 48,
        lo & 0xFFFF_FFFF_FFFF
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generation_is_deterministic() {
        let generator = RecordGenerator::new(1_700_000_000_000);
        assert_eq!(generator.generate(42), generator.generate(42));
        assert_ne!(generator.generate(42).payload, generator.generate(43).payload);
    }

    #[test]
    fn fields_follow_index() {
        let generator = RecordGenerator::new(50_000);
        let record = generator.generate(12_345);

        assert_eq!(record.id, 12_345);
        assert_eq!(record.timestamp_millis, 50_000 - 2_345);
        assert!((record.amount - 345.0 * 1.37).abs() < 1e-9);
        assert_eq!(record.customer_key, "Customer-345");
        assert!(record.payload.starts_with("payload_12345_"));
        assert!(record.payload.ends_with("magna_aliqua"));
        assert!(record.payload.len() > 120);
    }

    #[test]
    fn timestamp_saturates_near_epoch() {
        let record = RecordGenerator::new(3).generate(9);
        assert_eq!(record.timestamp_millis, 0);
    }

    #[test]
    fn tokens_are_uuid_shaped_and_distinct() {
        let tokens: HashSet<_> = (0..1000).map(payload_token).collect();
        assert_eq!(tokens.len(), 1000);

        let token = payload_token(0);
        let groups: Vec<_> = token.split('-').map(str::len).collect();
        assert_eq!(groups, [8, 4, 4, 4, 12]);
    }
}
