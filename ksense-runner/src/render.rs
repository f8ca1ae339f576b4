//! Renderer seam for live series.
//!
//! Drawing is left to whatever toolkit the host provides. The monitor only
//! hands a [`Renderer`] four equal-length series per tick; a renderer is
//! passed in explicitly, so "plotting disabled" is simply no renderer.

use std::path::Path;

use crate::sink::{CsvSink, SinkError};

/// Borrowed view of the series a renderer draws.
#[derive(Debug, Clone, Copy)]
pub struct SeriesFrame<'a> {
    pub time: &'a [f64],
    pub distance: &'a [f64],
    pub energy: &'a [f64],
    pub direction: &'a [f64],
}

impl SeriesFrame<'_> {
    /// True when all four series have the same length.
    pub fn is_consistent(&self) -> bool {
        let n = self.time.len();
        self.distance.len() == n && self.energy.len() == n && self.direction.len() == n
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

pub trait Renderer: Send {
    /// Accept a new frame. Inconsistent frames are ignored and return `false`.
    fn update(&mut self, frame: &SeriesFrame<'_>) -> bool;

    /// Persist the most recent frame.
    fn save(&self, path: &Path) -> Result<(), SinkError>;
}

/// Renderer that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn update(&mut self, frame: &SeriesFrame<'_>) -> bool {
        frame.is_consistent()
    }

    fn save(&self, _path: &Path) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps the latest consistent frame and saves it as CSV.
#[derive(Debug, Default, Clone)]
pub struct SeriesRecorder {
    time: Vec<f64>,
    distance: Vec<f64>,
    energy: Vec<f64>,
    direction: Vec<f64>,
    updates: usize,
}

impl SeriesRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accepted frames.
    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn frame(&self) -> SeriesFrame<'_> {
        SeriesFrame {
            time: &self.time,
            distance: &self.distance,
            energy: &self.energy,
            direction: &self.direction,
        }
    }
}

fn field(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        String::new()
    }
}

impl Renderer for SeriesRecorder {
    fn update(&mut self, frame: &SeriesFrame<'_>) -> bool {
        if !frame.is_consistent() {
            return false;
        }
        self.time = frame.time.to_vec();
        self.distance = frame.distance.to_vec();
        self.energy = frame.energy.to_vec();
        self.direction = frame.direction.to_vec();
        self.updates += 1;
        true
    }

    fn save(&self, path: &Path) -> Result<(), SinkError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|source| SinkError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        let mut sink = CsvSink::open(path, &["time", "distance", "energy", "direction"])?;
        for i in 0..self.time.len() {
            sink.append_row([
                field(self.time[i]),
                field(self.distance[i]),
                field(self.energy[i]),
                field(self.direction[i]),
            ])?;
        }
        Ok(())
    }
}
