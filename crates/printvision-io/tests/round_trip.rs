//! Files written by the store read back with the same pixels and metadata.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use image::{Rgb, RgbImage};
use printvision_engine::{
    Canvas, ColorModel, DetectionConfig, EngineConfig, Raster, RasterMetadata, RasterStore,
    Resolution, Session, Workspace,
};
use printvision_io::{FsStore, save_preview_png};

struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("printvision-io-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[test]
fn saved_canvas_loads_back_as_tile() {
    let dir = TempDir::new("canvas");
    let path = dir.0.join("out.tif");
    let canvas = Canvas {
        raster: Raster::from_vec::<u8>(3, 3, 4, (0..36).collect()).unwrap(),
        metadata: RasterMetadata {
            resolution: Some(Resolution::uniform(150.0)),
            color_model: ColorModel::Separated,
            ink_names: Some(
                ["Cyan", "Magenta", "Yellow", "Black"]
                    .map(String::from)
                    .to_vec(),
            ),
            ..RasterMetadata::default()
        },
    };

    let written = FsStore.save_canvas(&canvas, &path).unwrap();
    assert_eq!(written, std::fs::metadata(&path).unwrap().len());

    let tile = FsStore.load_tile(&path).unwrap();
    assert_eq!(tile.raster, canvas.raster);
    assert_eq!(tile.metadata.color_model, ColorModel::Separated);
    assert_eq!(tile.metadata.resolution, Some(Resolution::uniform(150.0)));
    assert_eq!(tile.metadata.ink_names, canvas.metadata.ink_names);
    assert_eq!(tile.metadata.cmyk_order, Some([0, 1, 2, 3]));
}

#[test]
fn png_background_drives_a_session() {
    let dir = TempDir::new("background");
    let path = dir.0.join("table.png");
    let img = RgbImage::from_fn(200, 200, |x, y| {
        if (50..150).contains(&x) && (80..120).contains(&y) {
            Rgb([20, 20, 20])
        } else {
            Rgb([240, 240, 240])
        }
    });
    save_preview_png(&img, &path).unwrap();

    let reference = FsStore.load_reference(&path).unwrap();
    let mut session = Session::new(EngineConfig {
        workspace: Workspace::new(200.0, 200.0),
        detection: DetectionConfig::raw_pixel(),
        render_dpi: None,
    })
    .unwrap();
    let summary = session.load_background(reference).unwrap();
    assert_eq!(summary.contours, 1);

    let geometry = &session.contours()[0].geometry;
    assert!((geometry.center().x - 100.0).abs() < 1.5);
    assert!((geometry.center().y - 100.0).abs() < 1.5);
}
