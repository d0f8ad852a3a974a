use std::sync::Mutex;
use std::time::Instant;

use vantage_protocol::{LatencyStats, MetricsSample, SessionSummary};

/// Push interface to the metrics collaborator. Latency samples come from the
/// telemetry side-channel; detection samples from the (external) detection
/// collaborator.
pub trait MetricsSink: Send + Sync {
    fn push(&self, sample: MetricsSample);
}

/// Throughput snapshot over the recording window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub window_sec: f64,
    pub samples: usize,
    pub fps: f64,
}

/// In-process sample aggregator producing end-of-session summaries.
pub struct MetricsRecorder {
    inner: Mutex<RecorderInner>,
}

struct RecorderInner {
    samples: Vec<MetricsSample>,
    window_start: Instant,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RecorderInner {
                samples: Vec::new(),
                window_start: Instant::now(),
            }),
        }
    }

    /// Samples-per-second over the window so far.
    pub fn latest(&self) -> WindowStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let window_sec = inner.window_start.elapsed().as_secs_f64();
        let fps = if window_sec > 0.0 {
            inner.samples.len() as f64 / window_sec
        } else {
            0.0
        };
        WindowStats {
            window_sec,
            samples: inner.samples.len(),
            fps,
        }
    }

    /// Summarize the session: processed fps plus median/p95 over the
    /// latency samples. Detection samples count toward throughput but not
    /// toward the latency percentiles.
    pub fn summary(&self) -> SessionSummary {
        let stats = self.latest();
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut latencies: Vec<f64> = inner
            .samples
            .iter()
            .filter_map(|s| match s {
                MetricsSample::Latency { latency_ms } => Some(*latency_ms as f64),
                MetricsSample::Detection { .. } => None,
            })
            .collect();
        latencies.sort_by(f64::total_cmp);

        let (median, p95) = if latencies.is_empty() {
            (None, None)
        } else {
            let idx_med = latencies.len() / 2;
            let idx_95 = ((latencies.len() as f64 * 0.95) as usize).min(latencies.len() - 1);
            (Some(latencies[idx_med]), Some(latencies[idx_95]))
        };

        SessionSummary {
            mode: "native".to_string(),
            processed_fps: (stats.fps * 100.0).round() / 100.0,
            e2e_latency_ms: LatencyStats { median, p95 },
            uplink_kbps: None,
            downlink_kbps: None,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsRecorder {
    fn push(&self, sample: MetricsSample) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.samples.push(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_recorder_has_no_percentiles() {
        let recorder = MetricsRecorder::new();
        let summary = recorder.summary();
        assert_eq!(summary.mode, "native");
        assert!(summary.e2e_latency_ms.median.is_none());
        assert!(summary.e2e_latency_ms.p95.is_none());
        assert!(summary.uplink_kbps.is_none());
    }

    #[test]
    fn percentiles_over_latency_samples() {
        let recorder = MetricsRecorder::new();
        for latency_ms in [40, 10, 30, 20] {
            recorder.push(MetricsSample::Latency { latency_ms });
        }
        let summary = recorder.summary();
        // Sorted [10, 20, 30, 40]: median index 2, p95 index min(3, 3)
        assert_eq!(summary.e2e_latency_ms.median, Some(30.0));
        assert_eq!(summary.e2e_latency_ms.p95, Some(40.0));
    }

    #[test]
    fn single_sample_is_both_percentiles() {
        let recorder = MetricsRecorder::new();
        recorder.push(MetricsSample::Latency { latency_ms: 55 });
        let summary = recorder.summary();
        // len 1: median index 0, p95 index min(0, 0)
        assert_eq!(summary.e2e_latency_ms.median, Some(55.0));
        assert_eq!(summary.e2e_latency_ms.p95, Some(55.0));
    }

    #[test]
    fn detection_samples_count_toward_throughput_only() {
        let recorder = MetricsRecorder::new();
        recorder.push(MetricsSample::Detection {
            overlay_ts: 1,
            preds_count: 3,
        });
        recorder.push(MetricsSample::Detection {
            overlay_ts: 2,
            preds_count: 1,
        });
        recorder.push(MetricsSample::Latency { latency_ms: 25 });

        assert_eq!(recorder.latest().samples, 3);
        let summary = recorder.summary();
        assert_eq!(summary.e2e_latency_ms.median, Some(25.0));
        assert_eq!(summary.e2e_latency_ms.p95, Some(25.0));
    }

    #[test]
    fn window_grows_monotonically() {
        let recorder = MetricsRecorder::new();
        let first = recorder.latest();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = recorder.latest();
        assert!(second.window_sec >= first.window_sec);
    }
}
