//! Stream monitor: collectors, per-tick evaluation, and output wiring.
//!
//! Each observation is one tick. The value goes into the sub-bucket
//! histogram; the feature vector is scored against the reference window
//! *before* being pushed, so a row never scores against itself. Reports go to
//! an optional CSV sink and the running series to an optional renderer.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use ksense_core::{KsenseConfig, ReferenceWindow, SubBucketHistogram, WindowError};

use crate::render::{Renderer, SeriesFrame};
use crate::sink::{CsvSink, SinkError};
use crate::tick::{TickEvaluator, TickReport};

/// Half-life, in ticks, of the distance baseline and energy averages.
pub const DEFAULT_HALF_LIFE: f64 = 10.0;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("reference window: {0}")]
    Window(#[from] WindowError),

    #[error("sink: {0}")]
    Sink(#[from] SinkError),
}

/// Exponentially weighted mean with a half-life in samples.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    mean: Option<f64>,
}

impl Ewma {
    pub fn new(half_life: f64) -> Self {
        let alpha = 1.0 - (-std::f64::consts::LN_2 / half_life.max(f64::MIN_POSITIVE)).exp();
        Self { alpha, mean: None }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.mean {
            None => sample,
            Some(mean) => mean + self.alpha * (sample - mean),
        };
        self.mean = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.mean
    }
}

/// Series accumulated across ticks, one entry per tick.
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub time: Vec<f64>,
    /// NaN where the distance was undefined.
    pub distance: Vec<f64>,
    /// Smoothed mean of |Δ distance|.
    pub energy: Vec<f64>,
    /// +1 above the distance baseline, -1 below, 0 when undefined.
    pub direction: Vec<f64>,
}

impl Series {
    pub fn frame(&self) -> SeriesFrame<'_> {
        SeriesFrame {
            time: &self.time,
            distance: &self.distance,
            energy: &self.energy,
            direction: &self.direction,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

pub struct Monitor {
    evaluator: TickEvaluator,
    histogram: SubBucketHistogram,
    window: ReferenceWindow,
    tick: u64,
    baseline: Ewma,
    energy: Ewma,
    last_distance: Option<f64>,
    series: Series,
    sink: Option<CsvSink>,
    renderer: Option<Box<dyn Renderer>>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("tick", &self.tick)
            .field("histogram_total", &self.histogram.total())
            .field("window_len", &self.window.len())
            .field("sink", &self.sink)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

impl Monitor {
    pub fn new(config: KsenseConfig) -> Self {
        let histogram = SubBucketHistogram::new(config.histogram.subbits);
        let window = ReferenceWindow::new(config.window.capacity);
        Self {
            evaluator: TickEvaluator::new(config),
            histogram,
            window,
            tick: 0,
            baseline: Ewma::new(DEFAULT_HALF_LIFE),
            energy: Ewma::new(DEFAULT_HALF_LIFE),
            last_distance: None,
            series: Series::default(),
            sink: None,
            renderer: None,
        }
    }

    pub fn with_sink(mut self, sink: CsvSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_half_life(mut self, half_life: f64) -> Self {
        self.baseline = Ewma::new(half_life);
        self.energy = Ewma::new(half_life);
        self
    }

    /// Record one observation and evaluate the tick.
    ///
    /// On error the monitor is left as it was: the tick is not consumed and
    /// neither the histogram, the window nor the series change.
    pub fn observe(
        &mut self,
        time: f64,
        value: u64,
        features: Vec<f64>,
    ) -> Result<TickReport, MonitorError> {
        if features.is_empty() {
            return Err(WindowError::Empty.into());
        }
        if let Some(expected) = self.window.dim() {
            if expected != features.len() {
                return Err(WindowError::DimensionMismatch {
                    expected,
                    found: features.len(),
                }
                .into());
            }
        }

        let mut histogram = self.histogram.clone();
        histogram.record(value);
        let reference = self.window.snapshot();
        let report = self
            .evaluator
            .evaluate(self.tick, histogram.iter(), &reference, &features);

        if let Some(sink) = self.sink.as_mut() {
            sink.append_report(&report)?;
        }

        self.window.push(features)?;
        self.histogram = histogram;
        self.tick += 1;
        self.extend_series(time, report.distance);

        if let Some(renderer) = self.renderer.as_mut() {
            if !renderer.update(&self.series.frame()) {
                warn!(tick = report.tick, "renderer rejected frame");
            }
        }
        Ok(report)
    }

    fn extend_series(&mut self, time: f64, distance: Option<f64>) {
        let (energy, direction) = match distance {
            Some(d) => {
                let direction = match self.baseline.value() {
                    Some(base) if d > base => 1.0,
                    Some(base) if d < base => -1.0,
                    _ => 0.0,
                };
                self.baseline.update(d);
                let energy = match self.last_distance {
                    Some(prev) => self.energy.update((d - prev).abs()),
                    None => self.energy.value().unwrap_or(0.0),
                };
                self.last_distance = Some(d);
                (energy, direction)
            }
            None => (self.energy.value().unwrap_or(0.0), 0.0),
        };
        debug!(time, ?distance, energy, direction, "series extended");

        self.series.time.push(time);
        self.series.distance.push(distance.unwrap_or(f64::NAN));
        self.series.energy.push(energy);
        self.series.direction.push(direction);
    }

    /// Ticks evaluated so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn histogram(&self) -> &SubBucketHistogram {
        &self.histogram
    }

    pub fn window(&self) -> &ReferenceWindow {
        &self.window
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn config(&self) -> &KsenseConfig {
        self.evaluator.config()
    }

    /// Persist the renderer's latest frame. No-op without a renderer.
    pub fn save_plot(&self, path: &Path) -> Result<(), MonitorError> {
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.save(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SeriesRecorder;

    fn features(i: usize) -> Vec<f64> {
        let t = i as f64;
        vec![(t * 0.3).sin(), (t * 0.7).cos()]
    }

    #[test]
    fn ewma_first_sample_is_mean() {
        let mut e = Ewma::new(10.0);
        assert_eq!(e.value(), None);
        assert_eq!(e.update(4.0), 4.0);
        let next = e.update(0.0);
        assert!(next < 4.0 && next > 3.0);
    }

    #[test]
    fn distance_undefined_until_window_fills() {
        let mut m = Monitor::new(KsenseConfig::default());
        for i in 0..30 {
            let r = m.observe(i as f64, 100, features(i)).unwrap();
            assert!(r.distance.is_none(), "tick {i} should be undefined");
        }
        let r = m.observe(30.0, 100, features(30)).unwrap();
        assert!(r.distance.is_some());
        assert_eq!(m.ticks(), 31);
        assert_eq!(m.histogram().total(), 31);
    }

    #[test]
    fn series_stay_aligned() {
        let mut m = Monitor::new(KsenseConfig::default());
        for i in 0..40 {
            m.observe(i as f64, i as u64 + 1, features(i)).unwrap();
        }
        let s = m.series();
        assert_eq!(s.len(), 40);
        assert!(s.frame().is_consistent());
        assert!(s.distance[0].is_nan());
        assert!(s.distance[39].is_finite());
        assert_eq!(s.direction[0], 0.0);
    }

    #[test]
    fn window_dimension_mismatch_leaves_state_untouched() {
        let mut m = Monitor::new(KsenseConfig::default());
        m.observe(0.0, 1, vec![1.0, 2.0]).unwrap();
        let err = m.observe(1.0, 1, vec![1.0]).unwrap_err();
        assert!(matches!(err, MonitorError::Window(_)));
        assert_eq!(m.ticks(), 1);
        assert_eq!(m.histogram().total(), 1);
    }

    #[test]
    fn sink_failure_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.csv");
        let mut sink = CsvSink::open(&path, &["a"]).unwrap();
        // Fixes this writer's row width at one field; reports have five.
        sink.append_row(["x"]).unwrap();

        let mut m = Monitor::new(KsenseConfig::default()).with_sink(sink);
        let err = m.observe(0.0, 42, features(0)).unwrap_err();
        assert!(matches!(err, MonitorError::Sink(_)));
        assert_eq!(m.ticks(), 0);
        assert_eq!(m.histogram().total(), 0);
        assert!(m.window().is_empty());
        assert!(m.series().is_empty());
    }

    #[test]
    fn renderer_receives_frames() {
        let mut m = Monitor::new(KsenseConfig::default()).with_renderer(Box::new(SeriesRecorder::new()));
        for i in 0..5 {
            m.observe(i as f64, 10, features(i)).unwrap();
        }
        assert_eq!(m.series().len(), 5);
    }

    #[test]
    fn window_capacity_from_config() {
        let mut config = KsenseConfig::default();
        config.window.capacity = 3;
        let mut m = Monitor::new(config);
        for i in 0..10 {
            m.observe(i as f64, 1, features(i)).unwrap();
        }
        assert_eq!(m.window().len(), 3);
    }
}
