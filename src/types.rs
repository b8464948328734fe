use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

// Normalized box in the order the detection model reports it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

impl BoundingBox {
    pub fn new(ymin: f32, xmin: f32, ymax: f32, xmax: f32) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    /// Clamp every coordinate into `[0, 1]`.
    pub fn clamped(self) -> Self {
        Self {
            ymin: self.ymin.clamp(0.0, 1.0),
            xmin: self.xmin.clamp(0.0, 1.0),
            ymax: self.ymax.clamp(0.0, 1.0),
            xmax: self.xmax.clamp(0.0, 1.0),
        }
    }
}

/// One detection as reported by the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: i64,
    pub score: f32,
    pub bbox: BoundingBox,
}

/// The top detection was not the class we are looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassMismatch {
    pub expected: i64,
    /// `None` when the model reported no detection at all
    pub found: Option<i64>,
}

impl fmt::Display for ClassMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.found {
            Some(found) => write!(f, "looking for {} but got {}", self.expected, found),
            None => write!(f, "looking for {} but got no detection", self.expected),
        }
    }
}

/// Outcome of looking for the target class in one image.
#[derive(Debug, Clone, PartialEq)]
pub enum Detected<T> {
    Found(T),
    Mismatch(ClassMismatch),
}

impl<T> Detected<T> {
    pub fn map<U, F>(self, f: F) -> Detected<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Detected::Found(value) => Detected::Found(f(value)),
            Detected::Mismatch(mismatch) => Detected::Mismatch(mismatch),
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            Detected::Found(value) => Some(value),
            Detected::Mismatch(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Detected::Found(_))
    }
}

// Counters collected for a single label
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LabelStats {
    pub total: usize,
    pub not_detected_count: usize,
    pub failed_count: usize,
    pub train: usize,
    pub test: usize,
    pub count: usize,
    pub skip_count: usize,
}

impl LabelStats {
    pub fn increment_not_detected(&mut self) {
        self.not_detected_count += 1;
    }

    pub fn increment_failed(&mut self) {
        self.failed_count += 1;
    }
}

// Aggregate statistics printed at the end of a run
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub labels: IndexMap<String, LabelStats>,
    pub final_train_count: usize,
    pub final_test_count: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the counters of one label into the run.
    pub fn record_label(&mut self, label: &str, stats: LabelStats) {
        self.final_train_count += stats.train;
        self.final_test_count += stats.test;
        self.labels.insert(label.to_string(), stats);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        for (label, stats) in &self.labels {
            log::info!(
                "{}: {} files, {} duplicates/undecodable, {} not detected, {} failed, {} train, {} test",
                label,
                stats.total,
                stats.skip_count,
                stats.not_detected_count,
                stats.failed_count,
                stats.train,
                stats.test
            );
        }
        log::info!(
            "Final counts: {} train, {} test",
            self.final_train_count,
            self.final_test_count
        );

        let not_detected: usize = self.labels.values().map(|s| s.not_detected_count).sum();
        let failed: usize = self.labels.values().map(|s| s.failed_count).sum();
        if not_detected + failed > 0 {
            log::warn!(
                "Total skipped images: {} (not detected: {}, failed: {})",
                not_detected + failed,
                not_detected,
                failed
            );
        }
    }
}
