//! Raw series input: one observation per line.
use log::debug;
use std::io::{self, BufRead};

/// Observations read from a raw series file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub values: Vec<f64>,
    /// Lines that were empty, malformed or non-finite.
    pub skipped: usize,
}

/// Read the first whitespace-delimited token of each line as an observation.
///
/// # Errors
///
/// Propagates I/O errors from `reader`; unparseable lines are skipped.
pub fn read_raw_series<R: BufRead>(reader: R) -> io::Result<RawSeries> {
    let mut series = RawSeries::default();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_raw_line(&line) {
            Some(value) => series.values.push(value),
            None => {
                debug!("skipping raw line {}: {line:?}", number + 1);
                series.skipped += 1;
            }
        }
    }
    Ok(series)
}

/// Parse one raw line, ignoring anything after the first token.
#[must_use]
pub fn parse_raw_line(line: &str) -> Option<f64> {
    line.split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
