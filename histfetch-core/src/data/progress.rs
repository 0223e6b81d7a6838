//! Download progress reporting.
//!
//! Purely cosmetic: nothing here affects what a download returns.

use std::io::{self, Write};

/// Progress callback for batch downloads, advanced once per finished ticker.
pub trait DownloadProgress {
    fn advance(&mut self);

    /// Called once after the last ticker.
    fn finish(&mut self) {}
}

/// Reporter that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn advance(&mut self) {}
}

const BAR_WIDTH: usize = 50;
const FILL_CHAR: char = '*';

/// Fixed-width ASCII bar that rewrites its own line:
///
/// ```text
/// [**********************50%                        ]  1 of 2 downloaded
/// ```
///
/// Advancing past `total` is allowed: the percentage keeps counting past 100%
/// while the fill stays clamped to the bar width.
pub struct ProgressBar<W: Write = io::Stdout> {
    writer: W,
    total: usize,
    done: usize,
    label: String,
}

impl ProgressBar<io::Stdout> {
    pub fn stdout(total: usize, label: impl Into<String>) -> Self {
        Self::new(io::stdout(), total, label)
    }
}

impl ProgressBar<io::Stderr> {
    pub fn stderr(total: usize, label: impl Into<String>) -> Self {
        Self::new(io::stderr(), total, label)
    }
}

impl<W: Write> ProgressBar<W> {
    pub fn new(writer: W, total: usize, label: impl Into<String>) -> Self {
        Self {
            writer,
            total,
            done: 0,
            label: label.into(),
        }
    }

    pub fn completed(&self) -> usize {
        self.done
    }

    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        ((self.done as f64 / self.total as f64) * 100.0).round() as usize
    }

    /// Current line, without the leading carriage return.
    pub fn render(&self) -> String {
        let inner = BAR_WIDTH - 2;
        let percent = self.percent();
        let filled = ((percent.min(100) as f64 / 100.0) * inner as f64).round() as usize;

        let mut bar: Vec<char> = std::iter::once('[')
            .chain(std::iter::repeat(FILL_CHAR).take(filled))
            .chain(std::iter::repeat(' ').take(inner - filled))
            .chain(std::iter::once(']'))
            .collect();

        let pct = format!("{percent}%");
        let place = (BAR_WIDTH / 2).saturating_sub(percent.to_string().len());
        for (slot, ch) in bar.iter_mut().skip(place).zip(pct.chars()) {
            *slot = ch;
        }

        let bar: String = bar.into_iter().collect();
        format!("{bar}  {} of {} {}", self.done, self.total, self.label)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DownloadProgress for ProgressBar<W> {
    fn advance(&mut self) {
        self.done += 1;
        let line = self.render();
        // rendering failures never interrupt a download
        let _ = write!(self.writer, "\r{line}");
        let _ = self.writer.flush();
    }

    fn finish(&mut self) {
        let _ = writeln!(self.writer);
        let _ = self.writer.flush();
    }
}
