use crate::telemetry;
use sluice::{DisplaySink, RenderRecord};
use std::io::{self, Write};

/// Renders drained batches on a terminal (stdout unless built with
/// [`with_writer`](Self::with_writer)).
///
/// Each batch prints one progress line plus up to `preview` of its rows.
/// Lives on the display thread and is the only thing that writes rows out.
pub struct ConsoleSink<W = io::Stdout> {
    out: W,
    preview: usize,
    shown: usize,
}

impl ConsoleSink {
    pub fn new(preview: usize) -> Self {
        Self::with_writer(io::stdout(), preview)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub const fn with_writer(out: W, preview: usize) -> Self {
        Self {
            out,
            preview,
            shown: 0,
        }
    }

    fn write_batch(&mut self, rows: &[RenderRecord]) -> io::Result<()> {
        writeln!(self.out, "+{} rows ({} total)", rows.len(), self.shown)?;
        for row in rows.iter().take(self.preview) {
            writeln!(self.out, "{}", format_row(row))?;
        }
        self.out.flush()
    }

    fn write_cleared(&mut self) -> io::Result<()> {
        writeln!(self.out, "-- cleared --")?;
        self.out.flush()
    }
}

impl<W: Write> DisplaySink for ConsoleSink<W> {
    fn append(&mut self, rows: Vec<RenderRecord>) {
        self.shown += rows.len();
        telemetry::add_rows_drained(rows.len() as u64);
        if let Err(e) = self.write_batch(&rows) {
            tracing::warn!("Failed to render batch: {e}");
        }
    }

    fn clear(&mut self) {
        self.shown = 0;
        if let Err(e) = self.write_cleared() {
            tracing::warn!("Failed to render clear: {e}");
        }
    }
}

/// One table line: id, timestamp, amount, customer, summary.
fn format_row(row: &RenderRecord) -> String {
    format!(
        "{:>8} | {} | {:>14} | {:<12} | {}",
        row.id, row.timestamp_text, row.amount_text, row.customer_text, row.summary_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_line_keeps_every_column() {
        let row = RenderRecord {
            id: 7,
            timestamp_text: "2023-11-14 22:13:20.116".to_string(),
            amount_text: "9,59\u{a0}€".to_string(),
            customer_text: "Customer-7".to_string(),
            summary_text: "payload_7...".to_string(),
        };
        assert_eq!(
            format_row(&row),
            "       7 | 2023-11-14 22:13:20.116 |         9,59\u{a0}€ | Customer-7   | payload_7..."
        );
    }

    fn row(id: u64) -> RenderRecord {
        RenderRecord {
            id,
            timestamp_text: String::new(),
            amount_text: String::new(),
            customer_text: String::new(),
            summary_text: format!("p{id}"),
        }
    }

    /// A writer that refuses every write.
    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tracks_rows_since_last_clear() {
        let mut sink = ConsoleSink::with_writer(Vec::new(), 1);
        sink.append(vec![row(1), row(2)]);
        sink.append(vec![row(3)]);
        assert_eq!(sink.shown, 3);

        sink.clear();
        assert_eq!(sink.shown, 0);

        let text = String::from_utf8(sink.out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "+2 rows (2 total)");
        assert!(lines[1].ends_with("| p1"));
        assert_eq!(lines[2], "+1 rows (3 total)");
        assert_eq!(lines[4], "-- cleared --");
    }

    #[test]
    fn write_errors_do_not_stop_the_sink() {
        let mut sink = ConsoleSink::with_writer(Broken, 3);
        sink.append(vec![row(1)]);
        sink.clear();
        sink.append(vec![row(2), row(3)]);
        assert_eq!(sink.shown, 2);
    }
}
