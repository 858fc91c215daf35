//! Transfer statistics for single files and whole download sessions.
//!
//! Speeds are measured over a sliding window of recent writes, so the peak
//! reflects the fastest stretch of a transfer rather than its running
//! average.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Span of recent writes a speed reading is taken over.
const SPEED_WINDOW: Duration = Duration::from_secs(1);

/// A transfer has ramped up once it reaches this share of its peak speed.
const RAMP_UP_PERCENT: u64 = 80;

/// Statistics for a single file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// Bytes transferred by this run.
    pub size: u64,
    /// Bytes already on disk when the transfer started.
    pub resumed_from: u64,
    /// Time taken by the transfer.
    pub elapsed: Duration,
    /// Average speed in bytes per second.
    pub average_speed: u64,
    /// Peak speed in bytes per second.
    pub peak_speed: u64,
    /// Time until the speed first reached 80% of its peak.
    pub ramp_up_time: Option<Duration>,
}

impl FileStats {
    /// Size of the file on disk after the transfer.
    #[must_use]
    pub const fn final_size(&self) -> u64 {
        self.resumed_from + self.size
    }
}

/// Statistics for a session that may span several files (e.g. a run of
/// episodes plus their captions).
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Number of files transferred.
    pub files_downloaded: usize,
    /// Number of transfers that continued a partial file.
    pub files_resumed: usize,
    /// Number of files skipped because they were already complete.
    pub files_skipped: usize,
    /// Total bytes transferred.
    pub total_bytes: u64,
    /// Total elapsed time for the session.
    pub elapsed: Duration,
    /// Peak speed of any single transfer in bytes per second.
    pub peak_speed: u64,
    /// Mean ramp-up time of the transfers that ramped up.
    pub average_ramp_up: Option<Duration>,
}

impl SessionStats {
    /// Stats of a session that transferred nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            files_downloaded: 0,
            files_resumed: 0,
            files_skipped: 0,
            total_bytes: 0,
            elapsed: Duration::ZERO,
            peak_speed: 0,
            average_ramp_up: None,
        }
    }

    /// Average speed over the whole session in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_second(self.total_bytes, self.elapsed)
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bytes_per_second(bytes: u64, over: Duration) -> u64 {
    let secs = over.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Tracks one transfer while it runs.
#[derive(Debug)]
pub struct DownloadStatsTracker {
    started: Instant,
    resumed_from: u64,
    written: u64,
    /// `(when, bytes written by then)`, oldest first, spanning about one window.
    window: VecDeque<(Instant, u64)>,
    /// Every speed reading with the time it was taken at.
    readings: Vec<(Duration, u64)>,
}

impl DownloadStatsTracker {
    /// Creates a tracker for a transfer starting at byte `resumed_from`.
    #[must_use]
    pub fn new(resumed_from: u64) -> Self {
        Self::started_at(resumed_from, Instant::now())
    }

    fn started_at(resumed_from: u64, started: Instant) -> Self {
        Self {
            started,
            resumed_from,
            written: 0,
            window: VecDeque::from([(started, 0)]),
            readings: Vec::new(),
        }
    }

    /// Records written bytes and returns the current speed (bytes/sec).
    pub fn record_bytes(&mut self, bytes: u64) -> u64 {
        self.record_bytes_at(bytes, Instant::now())
    }

    fn record_bytes_at(&mut self, bytes: u64, now: Instant) -> u64 {
        self.written += bytes;
        self.window.push_back((now, self.written));
        while self.window.len() > 2
            && self
                .window
                .get(1)
                .is_some_and(|&(at, _)| now.duration_since(at) >= SPEED_WINDOW)
        {
            self.window.pop_front();
        }

        let Some(&(since, written_then)) = self.window.front() else {
            return 0;
        };
        let span = now.duration_since(since);
        if span.is_zero() {
            return 0;
        }
        let speed = bytes_per_second(self.written - written_then, span);
        self.readings.push((now.duration_since(self.started), speed));
        speed
    }

    /// Bytes recorded so far.
    #[must_use]
    pub const fn downloaded(&self) -> u64 {
        self.written
    }

    /// Highest speed read so far.
    #[must_use]
    pub fn peak_speed(&self) -> u64 {
        self.readings.iter().map(|&(_, speed)| speed).max().unwrap_or(0)
    }

    /// Time of the first reading at 80% of the peak, if any speed was read.
    #[must_use]
    pub fn ramp_up_time(&self) -> Option<Duration> {
        let threshold = self.peak_speed() * RAMP_UP_PERCENT / 100;
        self.readings
            .iter()
            .find(|&&(_, speed)| speed > 0 && speed >= threshold)
            .map(|&(at, _)| at)
    }

    /// Converts this tracker into final file statistics.
    #[must_use]
    pub fn into_file_stats(self) -> FileStats {
        self.finish_at(Instant::now())
    }

    fn finish_at(self, now: Instant) -> FileStats {
        let elapsed = now.duration_since(self.started);
        FileStats {
            size: self.written,
            resumed_from: self.resumed_from,
            elapsed,
            average_speed: bytes_per_second(self.written, elapsed),
            peak_speed: self.peak_speed(),
            ramp_up_time: self.ramp_up_time(),
        }
    }
}

/// Accumulates the stats of the files handled by one CLI run.
#[derive(Debug)]
pub struct SessionStatsBuilder {
    started: Instant,
    stats: SessionStats,
    ramp_up_total: Duration,
    ramped_up: u32,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    /// Starts a session clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            stats: SessionStats::new(),
            ramp_up_total: Duration::ZERO,
            ramped_up: 0,
        }
    }

    /// Records a file that was already complete.
    pub const fn add_skipped(&mut self) {
        self.stats.files_skipped += 1;
    }

    /// Records a completed transfer.
    pub fn add_download(&mut self, file: &FileStats) {
        let stats = &mut self.stats;
        stats.files_downloaded += 1;
        if file.resumed_from > 0 {
            stats.files_resumed += 1;
        }
        stats.total_bytes += file.size;
        stats.peak_speed = stats.peak_speed.max(file.peak_speed);
        if let Some(ramp) = file.ramp_up_time {
            self.ramp_up_total += ramp;
            self.ramped_up += 1;
        }
    }

    /// Stops the clock and returns the totals.
    #[must_use]
    pub fn build(self) -> SessionStats {
        SessionStats {
            elapsed: self.started.elapsed(),
            average_ramp_up: (self.ramped_up > 0).then(|| self.ramp_up_total / self.ramped_up),
            ..self.stats
        }
    }
}
