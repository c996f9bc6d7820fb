//! printvision: place a tile on every object of a scan-table photograph.
//!
//! Runs a whole session end to end: detect the objects on the
//! background, load the tile at its physical size, align it to one
//! object, apply that placement to every other object as a template,
//! render the canvas and write it as TIFF. Per-step diagnostics are
//! printed as a report or as JSON.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin printvision -- [OPTIONS] <BACKGROUND> <TILE> -o <OUT.tif>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser};
use printvision_engine::diagnostics::RunSummary;
use printvision_engine::preview::{centroid_overlay, session_overlay};
use printvision_engine::types::RgbImage;
use printvision_engine::{
    Clock, ContourId, DetectionConfig, EngineConfig, RasterStore, RunDiagnostics, Session,
    StageMetrics, Stopwatch, TileId, Workspace,
};
use printvision_io::{FsStore, save_preview_png};
use tracing_subscriber::EnvFilter;

/// Place a printable tile on detected scan-table objects.
///
/// Detects the objects on the background photograph, scales the tile
/// to physical size, binds it to one object and clones the placement
/// onto every other object before compositing the print canvas.
#[derive(Parser)]
#[command(name = "printvision", version)]
struct Cli {
    /// Background photograph of the scan table (PNG, JPEG, BMP, TIFF, WebP).
    background: PathBuf,

    /// Printable tile (TIFF keeps CMYK, bit depth and resolution).
    tile: PathBuf,

    /// Output TIFF path.
    #[arg(short, long)]
    output: PathBuf,

    /// Contour the tile is aligned to and the template is bound to.
    #[arg(long, default_value_t = 0)]
    template_contour: u32,

    /// Only place the primary tile; skip template cloning.
    #[arg(long)]
    no_template: bool,

    /// Output DPI. Defaults to the tile's own resolution.
    #[arg(long)]
    dpi: Option<f64>,

    /// Print bed width in millimeters.
    #[arg(long, default_value_t = Workspace::DEFAULT_WIDTH_MM)]
    workspace_width: f64,

    /// Print bed height in millimeters.
    #[arg(long, default_value_t = Workspace::DEFAULT_HEIGHT_MM)]
    workspace_height: f64,

    /// Minimum contour area in scene pixels².
    #[arg(long, default_value_t = DetectionConfig::DEFAULT_MIN_AREA)]
    min_area: f64,

    /// Gaussian blur sigma applied before thresholding.
    #[arg(long, default_value_t = DetectionConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Write a PNG preview with contours, tiles and centroids.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Write a PNG preview marking only the detected centroids.
    #[arg(long)]
    centroid_overlay: Option<PathBuf>,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full engine config as a JSON string.
    ///
    /// When provided, the workspace, detection and DPI flags are ignored.
    /// The JSON must be a valid `EngineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Increase log verbosity (`-v` debug, `-vv` trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Build an [`EngineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<EngineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(EngineConfig {
        workspace: Workspace::new(cli.workspace_width, cli.workspace_height),
        detection: DetectionConfig {
            min_area: cli.min_area,
            blur_sigma: cli.blur_sigma,
        },
        render_dpi: cli.dpi,
    })
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "engine config");

    let clock = StdClock::new();
    let diagnostics = match run(&cli, config, &clock) {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", diagnostics.report());
    }

    ExitCode::SUCCESS
}

/// Run one full session and collect its diagnostics.
fn run(cli: &Cli, config: EngineConfig, clock: &StdClock) -> Result<RunDiagnostics, String> {
    let store = FsStore;
    let mut watch = Stopwatch::start(clock);
    let mut session = Session::new(config).map_err(|e| format!("Invalid config: {e}"))?;

    let (background, took) = watch.measure(|| store.load_reference(&cli.background));
    let background = background.map_err(|e| e.to_string())?;
    watch.record(
        took,
        decode_metrics(
            "background",
            &cli.background,
            background.dimensions().width,
            background.dimensions().height,
            background.raster.channels(),
        ),
    );

    let (summary, took) = watch.measure(|| session.load_background(background));
    let summary = summary.map_err(|e| format!("Detection failed: {e}"))?;
    watch.record(
        took,
        StageMetrics::Detect {
            otsu_level: summary.otsu_level,
            inverted: summary.inverted,
            contour_count: summary.contours,
            rejected: summary.rejected,
            degenerate: summary.degenerate,
        },
    );

    let (tile, took) = watch.measure(|| store.load_tile(&cli.tile));
    let tile = tile.map_err(|e| e.to_string())?;
    watch.record(
        took,
        decode_metrics(
            "tile",
            &cli.tile,
            tile.raster.width(),
            tile.raster.height(),
            tile.raster.channels(),
        ),
    );

    let (tile_id, took) = watch.measure(|| session.load_tile(tile));
    let tile_id = tile_id.map_err(|e| format!("Cannot place tile: {e}"))?;
    if let Some(placed) = session.tile(tile_id) {
        let source = &placed.source.raster;
        watch.record(
            took,
            StageMetrics::Tile {
                scale_x: placed.scale.sx,
                scale_y: placed.scale.sy,
                width_mm: f64::from(source.width()) * placed.mm_per_pixel.x,
                height_mm: f64::from(source.height()) * placed.mm_per_pixel.y,
            },
        );
    }

    if !cli.no_template {
        let contour = ContourId(cli.template_contour);
        let (clones, took) = watch.measure(|| bind_and_apply(&mut session, tile_id, contour));
        watch.record(
            took,
            StageMetrics::Template {
                contour: contour.0,
                clones: clones?,
            },
        );
    }

    let (outcome, took) = watch.measure(|| session.render());
    let outcome = outcome.map_err(|e| format!("Render failed: {e}"))?;
    let dpi = session.render_resolution().map_or(0.0, |r| r.x);
    watch.record(
        took,
        StageMetrics::Render {
            width: outcome.canvas.raster.width(),
            height: outcome.canvas.raster.height(),
            dpi,
            composited: outcome.composited,
            skipped: outcome.skipped,
        },
    );

    let (written, took) = watch.measure(|| store.save_canvas(&outcome.canvas, &cli.output));
    let written = written.map_err(|e| e.to_string())?;
    watch.record(
        took,
        StageMetrics::Encode {
            format: "tiff".to_string(),
            output_bytes: usize::try_from(written).unwrap_or(usize::MAX),
        },
    );
    eprintln!("Canvas written to {} ({written} bytes)", cli.output.display());

    if let Some(ref path) = cli.overlay {
        write_preview(session_overlay(&session), path);
    }
    if let Some(ref path) = cli.centroid_overlay {
        let centroids: Vec<_> = session.contours().iter().map(|c| c.centroid).collect();
        let preview = session
            .current_background()
            .map(|bg| centroid_overlay(&bg.raster, &centroids));
        write_preview(preview, path);
    }

    Ok(watch.finish(RunSummary {
        contour_count: session.contours().len(),
        tile_count: session.tiles().len(),
        canvas_width: outcome.canvas.raster.width(),
        canvas_height: outcome.canvas.raster.height(),
    }))
}

fn write_preview(preview: Option<RgbImage>, path: &Path) {
    match preview {
        Some(image) => match save_preview_png(&image, path) {
            Ok(()) => eprintln!("Preview written to {}", path.display()),
            Err(e) => eprintln!("Error writing preview: {e}"),
        },
        None => tracing::warn!("no background loaded, preview skipped"),
    }
}

/// Align the tile to `contour`, bind the template there and clone it
/// onto every other contour.
fn bind_and_apply(session: &mut Session, tile: TileId, contour: ContourId) -> Result<usize, String> {
    session
        .align_tile_to_contour(tile, contour)
        .map_err(|e| format!("Cannot align tile: {e}"))?;
    let binding = session
        .bind_template(tile, contour)
        .map_err(|e| format!("Cannot bind template: {e}"))?;
    tracing::info!(?binding, "template bound");
    Ok(session.apply_template().unwrap_or(0))
}

fn decode_metrics(role: &str, path: &Path, width: u32, height: u32, channels: usize) -> StageMetrics {
    let input_bytes = std::fs::metadata(path)
        .ok()
        .and_then(|m| usize::try_from(m.len()).ok())
        .unwrap_or(0);
    StageMetrics::Decode {
        role: role.to_string(),
        input_bytes,
        width,
        height,
        channels,
    }
}

/// [`Clock`] backed by [`std::time::Instant`].
struct StdClock {
    origin: Instant,
}

impl StdClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
