use anyhow::{anyhow, bail};
use chrono::FixedOffset;
use clap::Parser;
use core::time::Duration;
use sluice::{BridgeConfig, CurrencyStyle, FormatConfig};

/// Row count used when the requested count is not a number.
pub const DEFAULT_ROWS: u64 = 60_000;

/// Runtime configuration for the `sluice` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is honored), with defaults matching the interactive tool.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sluice",
    version,
    about = "Load generated records through a throttled display bridge"
)]
pub struct CliArgs {
    /// Rows per load. Anything that is not a number falls back to 60000;
    /// values below 1 are raised to 1.
    ///
    /// Environment variable: `ROWS`
    #[arg(long, env = "ROWS", default_value_t = DEFAULT_ROWS.to_string())]
    pub rows: String,

    /// Number of loads to run back to back. Each load replaces the rows of
    /// the previous one.
    ///
    /// Environment variable: `LOADS`
    #[arg(long, env = "LOADS", default_value_t = 1)]
    pub loads: usize,

    /// Hardware parallelism hint; the pool runs `max(2, parallelism / 2)`
    /// workers. Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `PARALLELISM`
    #[arg(long, env = "PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Maximum rows moved to the display per tick.
    ///
    /// Environment variable: `MAX_BATCH`
    #[arg(long, env = "MAX_BATCH", default_value_t = sluice::DEFAULT_MAX_BATCH)]
    pub max_batch: usize,

    /// Minimum milliseconds between two display ticks.
    ///
    /// Environment variable: `TICK_MS`
    #[arg(long, env = "TICK_MS", default_value_t = 33)]
    pub tick_ms: u64,

    /// Bound the hand-off queue. Rows pushed while it is full are dropped and
    /// counted as failed. Unbounded when unset.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Largest row count a single load may request.
    ///
    /// Environment variable: `MAX_ROWS`
    #[arg(long, env = "MAX_ROWS", default_value_t = sluice::DEFAULT_MAX_ROWS)]
    pub max_rows: u64,

    /// Maximum summary length in characters, excluding the ellipsis.
    ///
    /// Environment variable: `SUMMARY_MAX_LEN`
    #[arg(long, env = "SUMMARY_MAX_LEN", default_value_t = sluice::DEFAULT_SUMMARY_MAX_LEN)]
    pub summary_max_len: usize,

    /// Currency format preset: `de-de` or `en-us`.
    ///
    /// Environment variable: `CURRENCY`
    #[arg(long, env = "CURRENCY", default_value_t = String::from("de-de"))]
    pub currency: String,

    /// Offset from UTC, in minutes, used to render timestamps.
    ///
    /// Environment variable: `UTC_OFFSET_MINUTES`
    #[arg(long, env = "UTC_OFFSET_MINUTES", default_value_t = 0, allow_negative_numbers = true)]
    pub utc_offset_minutes: i32,

    /// Fail the task of every n-th row to exercise failure reporting. 0
    /// disables it.
    ///
    /// Environment variable: `FAIL_EVERY`
    #[arg(long, env = "FAIL_EVERY", default_value_t = 0)]
    pub fail_every: u64,

    /// Rows printed from each drained batch.
    ///
    /// Environment variable: `PREVIEW`
    #[arg(long, env = "PREVIEW", default_value_t = 3)]
    pub preview: usize,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub bridge: BridgeConfig,
    pub rows: u64,
    pub loads: usize,
    pub preview: usize,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.loads == 0 {
            bail!("LOADS must be greater than 0");
        }
        if args.parallelism == Some(0) {
            bail!("PARALLELISM must be greater than 0");
        }
        if args.max_batch == 0 {
            bail!("MAX_BATCH must be greater than 0");
        }
        if args.tick_ms == 0 {
            bail!("TICK_MS must be greater than 0");
        }
        if args.queue_capacity == Some(0) {
            bail!("QUEUE_CAPACITY must be greater than 0");
        }
        if args.max_rows == 0 {
            bail!("MAX_ROWS must be greater than 0");
        }

        let currency = CurrencyStyle::from_locale(&args.currency)
            .ok_or_else(|| anyhow!("CURRENCY must be `de-de` or `en-us`, got `{}`", args.currency))?;
        let utc_offset = args
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                anyhow!(
                    "UTC_OFFSET_MINUTES ({}) must be within one day",
                    args.utc_offset_minutes
                )
            })?;

        let mut bridge = match args.parallelism {
            Some(parallelism) => BridgeConfig::with_parallelism(parallelism),
            None => BridgeConfig::default(),
        };
        bridge.max_batch = args.max_batch;
        bridge.min_tick_interval = Duration::from_millis(args.tick_ms);
        bridge.queue_capacity = args.queue_capacity;
        bridge.max_rows = args.max_rows;
        bridge.summary_max_len = args.summary_max_len;
        bridge.format = FormatConfig {
            utc_offset,
            currency,
        };
        bridge.fail_every = (args.fail_every > 0).then_some(args.fail_every);
        bridge.validate()?;

        Ok(Self {
            rows: parse_count(&args.rows),
            loads: args.loads,
            preview: args.preview,
            bridge,
        })
    }
}

/// Reads a row count from free text: surrounding whitespace is ignored,
/// anything unparsable yields [`DEFAULT_ROWS`], and the result is at least 1.
pub fn parse_count(text: &str) -> u64 {
    let text = text.trim();
    match text.parse::<i64>() {
        Ok(n) => n.max(1) as u64,
        Err(_) => text.parse::<u64>().unwrap_or(DEFAULT_ROWS),
    }
}
