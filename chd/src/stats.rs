//! Collecting and reporting construction statistics.

use std::io::Write;

/// Trait for collecting (and summarizing or reporting) events during
/// construction of a perfect hash function.
pub trait BuildStatsCollector {
    /// Called once per placed bucket, largest buckets first, with the bucket
    /// size and the displacement that resolved it. Default implementation does nothing.
    #[inline(always)] fn bucket(&mut self, _bucket_size: usize, _displacement: u32) {}

    /// Called once at the end of construction with the maximum committed
    /// displacement. Default implementation does nothing.
    #[inline(always)] fn end(&mut self, _d_max: u32) {}
}

/// Ignores all events and does nothing.
impl BuildStatsCollector for () {}

/// Reports events occurred during construction to the wrapped writer.
pub struct BuildStatsPrinter<W: Write = std::io::Stdout>(W);

impl BuildStatsPrinter<std::io::Stdout> {
    /// Reports construction events to the standard output.
    pub fn stdout() -> Self { Self(std::io::stdout()) }
}

impl<W: Write> BuildStatsPrinter<W> {
    /// Reports construction events to `output`.
    pub fn new(output: W) -> Self { Self(output) }
}

impl<W: Write> BuildStatsCollector for BuildStatsPrinter<W> {
    fn bucket(&mut self, bucket_size: usize, displacement: u32) {
        writeln!(self.0, "{} {}", bucket_size, displacement).unwrap();
    }

    fn end(&mut self, d_max: u32) {
        writeln!(self.0, "Completed with maximum displacement {}.", d_max).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_reports_buckets_and_end() {
        let mut out = Vec::new();
        {
            let mut printer = BuildStatsPrinter::new(&mut out);
            printer.bucket(3, 2);
            printer.bucket(1, 5);
            printer.end(5);
        }
        assert_eq!(out, b"3 2\n1 5\nCompleted with maximum displacement 5.\n");
    }
}
