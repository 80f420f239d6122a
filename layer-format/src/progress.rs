use std::io::{self, Read};
use std::time::{Duration, Instant};

/// Minimum time between two progress callbacks while copying a layer.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Forwards progress values to a callback, clamped to `[0, 1]` and never
/// lower than the previous value.
pub(crate) struct Progress<F> {
    callback: F,
    last: Option<f64>,
}

impl<F: FnMut(f64)> Progress<F> {
    pub(crate) fn new(callback: F) -> Progress<F> {
        Progress {
            callback,
            last: None,
        }
    }

    pub(crate) fn report(&mut self, value: f64) {
        let value = value.clamp(0.0, 1.0);
        if matches!(self.last, Some(last) if value < last) {
            return;
        }
        self.last = Some(value);
        (self.callback)(value);
    }

    /// Reports `fraction` of the way from `start` to `end`.
    pub(crate) fn report_within(&mut self, start: f64, end: f64, fraction: f64) {
        self.report(start + (end - start) * fraction.clamp(0.0, 1.0));
    }
}

/// Counts bytes flowing through `inner` and reports `current / total`,
/// throttled to one call per `interval`. Exactly one final `1.0` is reported
/// when the stream ends.
pub(crate) struct ProgressReader<R, F> {
    inner: R,
    total: u64,
    current: u64,
    interval: Duration,
    last_emit: Instant,
    finished: bool,
    callback: F,
}

impl<R: Read, F: FnMut(f64)> ProgressReader<R, F> {
    pub(crate) fn new(inner: R, total: u64, interval: Duration, callback: F) -> Self {
        ProgressReader {
            inner,
            total,
            current: 0,
            interval,
            last_emit: Instant::now(),
            finished: false,
            callback,
        }
    }
}

impl<R: Read, F: FnMut(f64)> Read for ProgressReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;

        if n > 0 {
            self.current += n as u64;
            if self.total > 0 && self.last_emit.elapsed() >= self.interval {
                let fraction = (self.current as f64 / self.total as f64).min(1.0);
                (self.callback)(fraction);
                self.last_emit = Instant::now();
            }
        } else if !buf.is_empty() && !self.finished {
            self.finished = true;
            (self.callback)(1.0);
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut seen = vec![];
        {
            let mut progress = Progress::new(|v| seen.push(v));
            progress.report(0.0);
            progress.report(0.5);
            progress.report(0.2);
            progress.report(0.5);
            progress.report(7.0);
        }
        assert_eq!(seen, [0.0, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn report_within_maps_into_band() {
        let mut seen = vec![];
        {
            let mut progress = Progress::new(|v| seen.push(v));
            progress.report_within(0.2, 0.8, 0.0);
            progress.report_within(0.2, 0.8, 0.5);
            progress.report_within(0.2, 0.8, 1.0);
        }
        assert_eq!(seen.len(), 3);
        assert!((seen[0] - 0.2).abs() < 1e-9);
        assert!((seen[1] - 0.5).abs() < 1e-9);
        assert!((seen[2] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn reader_reports_final_value_once() {
        let data = vec![7u8; 4096];
        let mut seen = vec![];
        let mut out = vec![];
        {
            let mut reader = ProgressReader::new(
                &data[..],
                data.len() as u64,
                Duration::from_secs(3600),
                |v| seen.push(v),
            );
            std::io::copy(&mut reader, &mut out).unwrap();
            let mut buf = [0u8; 8];
            assert_eq!(reader.read(&mut buf).unwrap(), 0);
            assert_eq!(reader.read(&mut buf).unwrap(), 0);
        }

        assert_eq!(out, data);
        assert_eq!(seen, [1.0]);
    }

    #[test]
    fn reader_fractions_are_monotonic() {
        let data = vec![7u8; 64 * 1024];
        let mut seen = vec![];
        {
            let mut reader =
                ProgressReader::new(&data[..], data.len() as u64, Duration::ZERO, |v| seen.push(v));
            let mut buf = [0u8; 1000];
            while reader.read(&mut buf).unwrap() > 0 {}
        }

        assert!(seen.len() > 1);
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn reader_throttles() {
        let data = vec![0u8; 64 * 1024];
        let mut seen = vec![];
        {
            let mut reader = ProgressReader::new(
                &data[..],
                data.len() as u64,
                Duration::from_secs(3600),
                |v| seen.push(v),
            );
            let mut buf = [0u8; 512];
            while reader.read(&mut buf).unwrap() > 0 {}
        }

        assert_eq!(seen, [1.0]);
    }

    #[test]
    fn undersized_total_is_clamped() {
        let data = vec![0u8; 1000];
        let mut seen = vec![];
        {
            let mut reader = ProgressReader::new(&data[..], 10, Duration::ZERO, |v| seen.push(v));
            std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
        }
        assert!(seen.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn unknown_total_only_reports_completion() {
        let data = vec![0u8; 1000];
        let mut seen = vec![];
        {
            let mut reader = ProgressReader::new(&data[..], 0, Duration::ZERO, |v| seen.push(v));
            std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
        }
        assert_eq!(seen, [1.0]);
    }
}
