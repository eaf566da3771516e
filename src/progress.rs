//! Progress reporting at chunk boundaries.
//!
//! Every pipeline stage runs to completion; the callback only gives the caller
//! a chance to refresh between chunks. There is no cancellation.

use rayon::prelude::*;
use std::fmt;

/// Number of voxels processed between two progress checkpoints
pub const CHUNK_SIZE: usize = 500_000;

/// Optional percentage callback. Reports are clamped to 100 and repeated
/// percentages are dropped. Within one run reports never decrease;
/// [`Progress::begin`] starts the next run, so a reporter can be reused
/// across operations.
pub struct Progress<'a> {
    callback: Option<Box<dyn FnMut(u8) + 'a>>,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    pub fn new(callback: impl FnMut(u8) + 'a) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            last: None,
        }
    }

    pub fn none() -> Self {
        Self {
            callback: None,
            last: None,
        }
    }

    /// Last percentage delivered to the callback
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    /// Forget earlier reports and report 0
    pub fn begin(&mut self) {
        self.last = None;
        self.report(0);
    }

    pub fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(callback) = self.callback.as_mut() {
            callback(percent);
        }
    }

    /// Report `done / total` of the way between `start` and `end`
    pub fn report_fraction(&mut self, start: u8, end: u8, done: usize, total: usize) {
        let fraction = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        let span = end.saturating_sub(start) as f64;
        self.report(start + (fraction.min(1.0) * span).round() as u8);
    }

    /// Child reporter whose 0–100 maps onto `start..=end` of this one
    pub fn scoped(&mut self, start: u8, end: u8) -> Progress<'_> {
        let span = end.saturating_sub(start) as u32;
        Progress::new(move |percent| {
            self.report(start + (percent as u32 * span / 100) as u8);
        })
    }
}

impl Default for Progress<'_> {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("callback", &self.callback.is_some())
            .field("last", &self.last)
            .finish()
    }
}

/// Fill a vector of `len` elements with `f(index)`, one chunk of
/// [`CHUNK_SIZE`] at a time, reporting between `span.0` and `span.1`.
/// Elements inside a chunk are computed in parallel.
pub(crate) fn fill_in_chunks<U, F>(
    len: usize,
    progress: &mut Progress<'_>,
    span: (u8, u8),
    f: F,
) -> Vec<U>
where
    U: Send + Copy + Default,
    F: Fn(usize) -> U + Sync,
{
    let mut output = vec![U::default(); len];
    let mut done = 0;
    for (chunk_index, chunk) in output.chunks_mut(CHUNK_SIZE).enumerate() {
        let offset = chunk_index * CHUNK_SIZE;
        chunk
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, out)| *out = f(offset + i));
        done += chunk.len();
        progress.report_fraction(span.0, span.1, done, len);
    }
    progress.report(span.1);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_are_monotonic_and_deduplicated() {
        let mut seen = Vec::new();
        {
            let mut progress = Progress::new(|p| seen.push(p));
            progress.report(0);
            progress.report(10);
            progress.report(10);
            progress.report(5);
            progress.report(250);
        }
        assert_eq!(seen, vec![0, 10, 100]);
    }

    #[test]
    fn test_begin_starts_a_new_run() {
        let mut seen = Vec::new();
        {
            let mut progress = Progress::new(|p| seen.push(p));
            progress.begin();
            progress.report(60);
            progress.report(100);
            progress.begin();
            progress.report(30);
            progress.report(20);
            assert_eq!(progress.last(), Some(30));
        }
        assert_eq!(seen, vec![0, 60, 100, 0, 30]);
    }

    #[test]
    fn test_scoped_progress_maps_into_parent_range() {
        let mut seen = Vec::new();
        {
            let mut progress = Progress::new(|p| seen.push(p));
            {
                let mut child = progress.scoped(50, 100);
                child.report(0);
                child.report(50);
                child.report(100);
            }
            assert_eq!(progress.last(), Some(100));
        }
        assert_eq!(seen, vec![50, 75, 100]);
    }

    #[test]
    fn test_fill_in_chunks_reports_each_chunk() {
        let mut seen = Vec::new();
        let len = CHUNK_SIZE * 2 + 10;
        let output = {
            let mut progress = Progress::new(|p| seen.push(p));
            fill_in_chunks(len, &mut progress, (10, 90), |i| (i % 7) as u8)
        };
        assert_eq!(output.len(), len);
        assert_eq!(output[CHUNK_SIZE + 3], ((CHUNK_SIZE + 3) % 7) as u8);
        // the last partial chunk lands on 90 again and is dropped
        assert_eq!(seen, vec![50, 90]);
    }

    #[test]
    fn test_fill_in_chunks_empty() {
        let output: Vec<f32> = fill_in_chunks(0, &mut Progress::none(), (0, 100), |_| 1.0);
        assert!(output.is_empty());
    }
}
