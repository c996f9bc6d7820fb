//! Run diagnostics: timing and counts for each step of a session run.
//!
//! A [`Stopwatch`] collects one [`StageDiagnostics`] per step as a
//! caller drives a [`Session`](crate::session::Session) through decode,
//! detection, tile placement, templating, rendering and encoding. The
//! engine never reads the system clock itself; time comes from a
//! [`Clock`] supplied by the caller.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Monotonic time source.
///
/// `now` returns the time elapsed since an arbitrary fixed origin; only
/// differences between readings are meaningful.
pub trait Clock {
    /// Current reading.
    fn now(&self) -> Duration;
}

/// Diagnostics for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this step (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Step-specific metrics.
    pub metrics: StageMetrics,
}

/// Metrics that vary by step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Decoding an input file.
    Decode {
        /// What was decoded (`"background"`, `"tile"`).
        role: String,
        /// Size of the encoded input.
        input_bytes: usize,
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Samples per pixel.
        channels: usize,
    },
    /// Object detection on the background.
    Detect {
        /// Otsu threshold.
        otsu_level: u8,
        /// Whether the mask was inverted.
        inverted: bool,
        /// Contours kept.
        contour_count: usize,
        /// Contours below the minimum area.
        rejected: usize,
        /// Contours with degenerate geometry.
        degenerate: usize,
    },
    /// Loading the primary tile into the scene.
    Tile {
        /// Horizontal scene pixels per tile pixel.
        scale_x: f64,
        /// Vertical scene pixels per tile pixel.
        scale_y: f64,
        /// Physical width in millimeters.
        width_mm: f64,
        /// Physical height in millimeters.
        height_mm: f64,
    },
    /// Binding and applying the template.
    Template {
        /// Contour the template was bound to.
        contour: u32,
        /// Clones created.
        clones: usize,
    },
    /// Compositing the canvas.
    Render {
        /// Canvas width in pixels.
        width: u32,
        /// Canvas height in pixels.
        height: u32,
        /// Horizontal render resolution.
        dpi: f64,
        /// Tiles that touched the canvas.
        composited: usize,
        /// Tiles entirely outside the canvas.
        skipped: usize,
    },
    /// Serializing an output file.
    Encode {
        /// Output format name.
        format: String,
        /// Encoded size.
        output_bytes: usize,
    },
}

impl StageMetrics {
    /// Short human-readable step name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "Decode",
            Self::Detect { .. } => "Detect",
            Self::Tile { .. } => "Load Tile",
            Self::Template { .. } => "Template",
            Self::Render { .. } => "Render",
            Self::Encode { .. } => "Encode",
        }
    }
}

/// High-level counts for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Detected contours.
    pub contour_count: usize,
    /// Placed tiles (primary plus clones).
    pub tile_count: usize,
    /// Canvas width in pixels.
    pub canvas_width: u32,
    /// Canvas height in pixels.
    pub canvas_height: u32,
}

/// Diagnostics collected from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Steps in execution order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts.
    pub summary: RunSummary,
}

impl RunDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Run Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Canvas: {}x{}  |  Contours: {}  |  Tiles: {}",
            self.summary.canvas_width,
            self.summary.canvas_height,
            self.summary.contour_count,
            self.summary.tile_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for stage in &self.stages {
            let ms = duration_ms(stage.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let name = stage.metrics.label();
            let details = format_metrics(&stage.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Collects stage timings against a [`Clock`].
pub struct Stopwatch<'c, C: Clock + ?Sized> {
    clock: &'c C,
    started: Duration,
    stages: Vec<StageDiagnostics>,
}

impl<'c, C: Clock + ?Sized> Stopwatch<'c, C> {
    /// Start timing a run.
    pub fn start(clock: &'c C) -> Self {
        Self {
            clock,
            started: clock.now(),
            stages: Vec::new(),
        }
    }

    /// Run `f` and return its result with the time it took.
    pub fn measure<T>(&self, f: impl FnOnce() -> T) -> (T, Duration) {
        let before = self.clock.now();
        let value = f();
        (value, self.clock.now().saturating_sub(before))
    }

    /// Record a finished step.
    pub fn record(&mut self, duration: Duration, metrics: StageMetrics) {
        self.stages.push(StageDiagnostics { duration, metrics });
    }

    /// Steps recorded so far.
    #[must_use]
    pub fn stages(&self) -> &[StageDiagnostics] {
        &self.stages
    }

    /// Stop timing and assemble the run diagnostics.
    #[must_use]
    pub fn finish(self, summary: RunSummary) -> RunDiagnostics {
        RunDiagnostics {
            total_duration: self.clock.now().saturating_sub(self.started),
            stages: self.stages,
            summary,
        }
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            role,
            input_bytes,
            width,
            height,
            channels,
        } => format!("{role}: {input_bytes} bytes -> {width}x{height}x{channels}"),
        StageMetrics::Detect {
            otsu_level,
            inverted,
            contour_count,
            rejected,
            degenerate,
        } => {
            let inv = if *inverted { " inverted" } else { "" };
            format!(
                "otsu={otsu_level}{inv} kept={contour_count} rejected={rejected} degenerate={degenerate}",
            )
        }
        StageMetrics::Tile {
            scale_x,
            scale_y,
            width_mm,
            height_mm,
        } => format!("scale={scale_x:.3}x{scale_y:.3} size={width_mm:.1}x{height_mm:.1}mm"),
        StageMetrics::Template { contour, clones } => {
            format!("bound to contour {contour}, {clones} clones")
        }
        StageMetrics::Render {
            width,
            height,
            dpi,
            composited,
            skipped,
        } => format!("{width}x{height} @ {dpi:.1}dpi, {composited} tiles ({skipped} off-canvas)"),
        StageMetrics::Encode {
            format,
            output_bytes,
        } => format!("{format}: {output_bytes} bytes"),
    }
}
