//! The editing session: one background, its contours and the placed
//! tiles derived from them.
//!
//! Entities are values addressed by [`ContourId`] and [`TileId`]; no
//! entity refers back to the session. Every mutating call either
//! succeeds completely or returns an error and leaves the session as it
//! was. Observers registered with [`Session::subscribe`] are told what
//! kind of change happened after each successful mutation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compose::{self, RenderError, RenderOutcome};
use crate::detect::detect;
use crate::geometry::{ContourGeometry, normalize_degrees};
use crate::placement::{
    ContourId, PlacedTile, TemplateBinding, TemplateEngine, TemplateState, TileId, TileKind,
    TileSet,
};
use crate::raster::{RasterMetadata, ReferenceRaster, TileImage};
use crate::scale::{mm_per_pixel, scale_factor};
use crate::types::{
    EngineConfig, EngineError, MmPerPixel, Point, Resolution, ScaleFactor, Workspace,
};

/// Recoverable failures of session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Detection found nothing above the minimum area.
    #[error("no objects detected ({rejected} contours below the minimum area)")]
    NoObjects {
        /// Contours discarded by the area filter.
        rejected: usize,
    },

    /// Invalid input or configuration.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The operation needs a background.
    #[error("no background loaded")]
    NoBackground,

    /// The operation needs a tile.
    #[error("no tile loaded")]
    NoTile,

    /// No tile has this id.
    #[error("unknown tile {0:?}")]
    UnknownTile(TileId),

    /// No contour has this id.
    #[error("unknown contour {0:?}")]
    UnknownContour(ContourId),

    /// The tile declares no resolution and there is no background to
    /// borrow a physical scale from.
    #[error("tile has no resolution and no background is loaded")]
    UnknownScale,

    /// Neither a DPI override nor a tile resolution is available.
    #[error("no render resolution: set one or load a tile with DPI metadata")]
    MissingDpi,
}

/// What changed in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A background was loaded and contours replaced.
    BackgroundLoaded,
    /// The background and everything derived from it were removed.
    BackgroundCleared,
    /// The workspace size changed and tiles were rescaled.
    WorkspaceChanged,
    /// A new primary tile was loaded.
    TileLoaded,
    /// A tile was moved or aligned.
    TileMoved,
    /// A tile's rotation changed.
    TileRotated,
    /// A tile was removed.
    TileRemoved,
    /// A template binding was created.
    TemplateBound,
    /// Template clones were regenerated.
    TemplateApplied,
}

/// Notification delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Kind of change.
    pub kind: ChangeKind,
    /// Tile concerned, if any.
    pub tile: Option<TileId>,
    /// Contour concerned, if any.
    pub contour: Option<ContourId>,
}

impl SessionEvent {
    const fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            tile: None,
            contour: None,
        }
    }
}

/// A detected object with its oriented geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContour {
    /// Stable id.
    pub id: ContourId,
    /// Area centroid in background pixels.
    pub centroid: Point,
    /// Enclosed area in pixels².
    pub area: f64,
    /// Oriented bounding geometry.
    pub geometry: ContourGeometry,
}

/// Outcome of [`Session::load_background`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundSummary {
    /// Contours kept.
    pub contours: usize,
    /// Contours below the minimum area.
    pub rejected: usize,
    /// Contours skipped for degenerate geometry.
    pub degenerate: usize,
    /// Otsu threshold.
    pub otsu_level: u8,
    /// Whether the mask was inverted.
    pub inverted: bool,
}

type Observer = Box<dyn FnMut(&SessionEvent)>;

/// Single-threaded editing session.
pub struct Session {
    config: EngineConfig,
    background: Option<ReferenceRaster>,
    background_mmpp: Option<MmPerPixel>,
    contours: Vec<SessionContour>,
    next_contour: u32,
    tiles: TileSet,
    template: TemplateEngine,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("has_background", &self.background.is_some())
            .field("contours", &self.contours.len())
            .field("tiles", &self.tiles.len())
            .field("template", &self.template.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start an empty session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] if the configuration is invalid.
    pub fn new(config: EngineConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            background: None,
            background_mmpp: None,
            contours: Vec::new(),
            next_contour: 0,
            tiles: TileSet::new(),
            template: TemplateEngine::new(),
            observers: Vec::new(),
        })
    }

    /// Register an observer called after every successful mutation.
    pub fn subscribe(&mut self, observer: impl FnMut(&SessionEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn emit(&mut self, event: SessionEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }

    // ───── accessors ─────

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The loaded background, if any.
    #[must_use]
    pub const fn current_background(&self) -> Option<&ReferenceRaster> {
        self.background.as_ref()
    }

    /// Physical size of one background pixel.
    #[must_use]
    pub const fn background_mm_per_pixel(&self) -> Option<MmPerPixel> {
        self.background_mmpp
    }

    /// Detected contours in detection order.
    #[must_use]
    pub fn contours(&self) -> &[SessionContour] {
        &self.contours
    }

    /// Look up a contour.
    #[must_use]
    pub fn contour(&self, id: ContourId) -> Option<&SessionContour> {
        self.contours.iter().find(|c| c.id == id)
    }

    /// All placed tiles.
    #[must_use]
    pub const fn tiles(&self) -> &TileSet {
        &self.tiles
    }

    /// Look up a placed tile.
    #[must_use]
    pub fn tile(&self, id: TileId) -> Option<&PlacedTile> {
        self.tiles.get(id)
    }

    /// Template engine state.
    #[must_use]
    pub const fn template_state(&self) -> TemplateState {
        self.template.state()
    }

    /// Active template binding.
    #[must_use]
    pub const fn binding(&self) -> Option<&TemplateBinding> {
        self.template.binding()
    }

    // ───── background ─────

    /// Replace the background and run detection on it.
    ///
    /// Contours, template clones and the binding are replaced; the
    /// primary tile is kept and rescaled to the new background.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] for an empty raster and
    /// [`SessionError::NoObjects`] when detection keeps nothing. The
    /// session is unchanged in both cases.
    pub fn load_background(
        &mut self,
        background: ReferenceRaster,
    ) -> Result<BackgroundSummary, SessionError> {
        if background.raster.is_empty() {
            return Err(EngineError::EmptyInput.into());
        }

        let detection = detect(&background.raster, &self.config.detection);
        let mut degenerate = detection.degenerate;
        let mut contours = Vec::with_capacity(detection.len());
        let mut next = self.next_contour;
        for object in detection.objects {
            let Some(geometry) = ContourGeometry::from_polygon(object.contour) else {
                tracing::warn!(
                    centroid = ?object.centroid,
                    "skipping contour with degenerate bounding box"
                );
                degenerate += 1;
                continue;
            };
            contours.push(SessionContour {
                id: ContourId(next),
                centroid: object.centroid,
                area: object.area,
                geometry,
            });
            next += 1;
        }
        if contours.is_empty() {
            return Err(SessionError::NoObjects {
                rejected: detection.rejected,
            });
        }

        let summary = BackgroundSummary {
            contours: contours.len(),
            rejected: detection.rejected,
            degenerate,
            otsu_level: detection.otsu_level,
            inverted: detection.inverted,
        };

        self.template.clear(&mut self.tiles);
        self.background_mmpp = mm_per_pixel(self.config.workspace, background.dimensions());
        self.background = Some(background);
        self.contours = contours;
        self.next_contour = next;
        self.rescale_tiles();

        self.emit(SessionEvent::new(ChangeKind::BackgroundLoaded));
        Ok(summary)
    }

    /// Drop the background, its contours and every placed tile.
    pub fn clear_background(&mut self) {
        self.template.clear(&mut self.tiles);
        self.tiles.clear();
        self.background = None;
        self.background_mmpp = None;
        self.contours.clear();
        self.emit(SessionEvent::new(ChangeKind::BackgroundCleared));
    }

    /// Change the physical size of the print bed.
    ///
    /// The background scale is recomputed and every tile is rescaled
    /// about its own center.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] for a non-positive workspace.
    pub fn set_workspace(&mut self, workspace: Workspace) -> Result<(), SessionError> {
        let config = EngineConfig {
            workspace,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        self.background_mmpp = self
            .background
            .as_ref()
            .and_then(|bg| mm_per_pixel(workspace, bg.dimensions()));
        self.rescale_tiles();
        self.emit(SessionEvent::new(ChangeKind::WorkspaceChanged));
        Ok(())
    }

    /// Recompute every tile's scene scale from scratch, keeping centers.
    fn rescale_tiles(&mut self) {
        let background = self.background_mmpp;
        for (_, tile) in self.tiles.iter_mut() {
            let center = tile.scene_center();
            let native = tile.source.metadata.mm_per_pixel();
            let (mmpp, scale) =
                physical_scale(native, background).unwrap_or((tile.mm_per_pixel, tile.scale));
            tile.mm_per_pixel = mmpp;
            tile.scale = scale;
            tile.set_center(center);
        }
    }

    // ───── tiles ─────

    /// Load a new primary tile, replacing all placed tiles.
    ///
    /// The tile is centered on the background (or on its own center
    /// when there is none) and scaled so one tile pixel covers its
    /// physical size in the scene.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] for an empty tile and
    /// [`SessionError::UnknownScale`] when neither the tile nor the
    /// background has a physical scale.
    pub fn load_tile(&mut self, tile: TileImage) -> Result<TileId, SessionError> {
        if tile.raster.is_empty() {
            return Err(EngineError::EmptyInput.into());
        }
        let (mmpp, scale) = physical_scale(tile.metadata.mm_per_pixel(), self.background_mmpp)
            .ok_or(SessionError::UnknownScale)?;

        let (w, h) = (
            f64::from(tile.raster.width()) * scale.sx,
            f64::from(tile.raster.height()) * scale.sy,
        );
        let center = self.background.as_ref().map_or(Point::new(w / 2.0, h / 2.0), |bg| {
            let d = bg.dimensions();
            Point::new(f64::from(d.width) / 2.0, f64::from(d.height) / 2.0)
        });

        self.template.clear(&mut self.tiles);
        self.tiles.clear();
        let id = self
            .tiles
            .insert(PlacedTile::primary(Arc::new(tile), center, scale, mmpp));
        tracing::info!(tile = id.0, sx = scale.sx, sy = scale.sy, "tile loaded");

        self.emit(SessionEvent {
            tile: Some(id),
            ..SessionEvent::new(ChangeKind::TileLoaded)
        });
        Ok(id)
    }

    /// Translate a tile by `delta` scene pixels.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTile`] for an unknown id.
    pub fn move_tile(&mut self, id: TileId, delta: Point) -> Result<(), SessionError> {
        let tile = self.tiles.get_mut(id).ok_or(SessionError::UnknownTile(id))?;
        tile.position = tile.position + delta;
        self.emit(SessionEvent {
            tile: Some(id),
            ..SessionEvent::new(ChangeKind::TileMoved)
        });
        Ok(())
    }

    /// Rotate a tile by `delta` degrees about its center.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTile`] for an unknown id.
    pub fn rotate_tile(&mut self, id: TileId, delta: f64) -> Result<(), SessionError> {
        let current = self.tiles.get(id).ok_or(SessionError::UnknownTile(id))?.rotation;
        self.set_tile_rotation(id, current + delta)
    }

    /// Set a tile's absolute rotation in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTile`] for an unknown id.
    pub fn set_tile_rotation(&mut self, id: TileId, degrees: f64) -> Result<(), SessionError> {
        let tile = self.tiles.get_mut(id).ok_or(SessionError::UnknownTile(id))?;
        tile.rotation = normalize_degrees(degrees);
        self.emit(SessionEvent {
            tile: Some(id),
            ..SessionEvent::new(ChangeKind::TileRotated)
        });
        Ok(())
    }

    /// Remove a tile. Removing the primary removes every clone too.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTile`] for an unknown id.
    pub fn remove_tile(&mut self, id: TileId) -> Result<(), SessionError> {
        let kind = self.tiles.get(id).ok_or(SessionError::UnknownTile(id))?.kind;
        match kind {
            TileKind::Primary => {
                self.template.clear(&mut self.tiles);
                self.tiles.clear();
            }
            TileKind::Clone { .. } => {
                self.template.forget_clone(id);
                self.tiles.remove(id);
            }
        }
        self.emit(SessionEvent {
            tile: Some(id),
            ..SessionEvent::new(ChangeKind::TileRemoved)
        });
        Ok(())
    }

    /// Center a tile on a contour and turn it to the contour's angle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTile`] or
    /// [`SessionError::UnknownContour`] for unknown ids.
    pub fn align_tile_to_contour(
        &mut self,
        tile: TileId,
        contour: ContourId,
    ) -> Result<(), SessionError> {
        let geometry = &self
            .contour(contour)
            .ok_or(SessionError::UnknownContour(contour))?
            .geometry;
        let (center, angle) = (geometry.center(), geometry.angle());
        let placed = self.tiles.get_mut(tile).ok_or(SessionError::UnknownTile(tile))?;
        placed.rotation = angle;
        placed.set_center(center);
        self.emit(SessionEvent {
            tile: Some(tile),
            contour: Some(contour),
            ..SessionEvent::new(ChangeKind::TileMoved)
        });
        Ok(())
    }

    // ───── template ─────

    /// Nominate `(tile, contour)` as the template pair.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTile`] or
    /// [`SessionError::UnknownContour`] for unknown ids.
    pub fn bind_template(
        &mut self,
        tile: TileId,
        contour: ContourId,
    ) -> Result<TemplateBinding, SessionError> {
        let geometry = &self
            .contours
            .iter()
            .find(|c| c.id == contour)
            .ok_or(SessionError::UnknownContour(contour))?
            .geometry;
        let placed = self.tiles.get(tile).ok_or(SessionError::UnknownTile(tile))?;
        let binding = self.template.create(tile, placed, contour, geometry);
        self.emit(SessionEvent {
            tile: Some(tile),
            contour: Some(contour),
            ..SessionEvent::new(ChangeKind::TemplateBound)
        });
        Ok(binding)
    }

    /// Place a clone of the template on every other contour.
    ///
    /// Returns the number of clones, or `None` (and changes nothing)
    /// when no template is bound.
    pub fn apply_template(&mut self) -> Option<usize> {
        let contours = self.contours.iter().map(|c| (c.id, &c.geometry));
        let applied = self.template.apply_template(&mut self.tiles, contours)?;
        self.emit(SessionEvent::new(ChangeKind::TemplateApplied));
        Some(applied)
    }

    // ───── output ─────

    /// Resolution the canvas will be rendered at: the configured
    /// override, else the primary tile's native resolution.
    #[must_use]
    pub fn render_resolution(&self) -> Option<Resolution> {
        self.config.render_dpi.map(Resolution::uniform).or_else(|| {
            self.tiles
                .iter()
                .next()
                .and_then(|(_, t)| t.source.metadata.resolution)
        })
    }

    /// Composite every placed tile onto a workspace-sized canvas.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoTile`] with nothing placed,
    /// [`SessionError::MissingDpi`] without a render resolution and
    /// [`SessionError::Render`] for compositor failures.
    pub fn render(&self) -> Result<RenderOutcome, SessionError> {
        if self.tiles.is_empty() {
            return Err(SessionError::NoTile);
        }
        let dpi = self.render_resolution().ok_or(SessionError::MissingDpi)?;
        let outcome = compose::render(
            self.config.workspace,
            dpi,
            self.tiles.iter().map(|(_, t)| t),
        )?;
        Ok(outcome)
    }

    /// Metadata a rendered canvas will carry: the first tile's color
    /// metadata with the render resolution.
    #[must_use]
    pub fn output_metadata(&self) -> Option<RasterMetadata> {
        let (_, first) = self.tiles.iter().next()?;
        Some(RasterMetadata {
            resolution: self.render_resolution(),
            ..first.source.metadata.clone()
        })
    }
}

/// Tile mm-per-pixel and scene scale.
///
/// A tile without a native resolution is drawn one tile pixel per
/// background pixel. Without a background the scene is the tile's own
/// pixel grid.
fn physical_scale(
    native: Option<MmPerPixel>,
    background: Option<MmPerPixel>,
) -> Option<(MmPerPixel, ScaleFactor)> {
    match (native, background) {
        (Some(tile), Some(bg)) => Some((tile, scale_factor(tile, bg)?)),
        (Some(tile), None) => Some((tile, ScaleFactor::IDENTITY)),
        (None, Some(bg)) => Some((bg, ScaleFactor::IDENTITY)),
        (None, None) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::raster::{ColorModel, Raster};
    use crate::types::{DetectionConfig, Dimensions};

    /// Light 400×400 table with dark rectangles (x, y, w, h).
    fn background(rects: &[(u32, u32, u32, u32)]) -> ReferenceRaster {
        let (w, h) = (400u32, 400u32);
        let mut values = vec![230u8; (w * h * 3) as usize];
        for &(rx, ry, rw, rh) in rects {
            for y in ry..ry + rh {
                for x in rx..rx + rw {
                    let i = ((y * w + x) * 3) as usize;
                    values[i..i + 3].copy_from_slice(&[20, 20, 20]);
                }
            }
        }
        ReferenceRaster::new(Raster::from_vec::<u8>(w, h, 3, values).unwrap())
    }

    fn cmyk_tile(dpi: Option<f64>) -> TileImage {
        let raster = Raster::from_vec::<u8>(10, 20, 4, vec![50; 10 * 20 * 4]).unwrap();
        TileImage::new(
            raster,
            RasterMetadata {
                resolution: dpi.map(Resolution::uniform),
                color_model: ColorModel::Separated,
                ..RasterMetadata::default()
            },
        )
    }

    fn session() -> Session {
        Session::new(EngineConfig {
            workspace: Workspace::new(400.0, 400.0),
            detection: DetectionConfig::raw_pixel(),
            render_dpi: None,
        })
        .unwrap()
    }

    fn four_objects() -> ReferenceRaster {
        background(&[
            (20, 20, 80, 40),
            (220, 20, 80, 40),
            (20, 220, 40, 80),
            (220, 220, 40, 80),
        ])
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            workspace: Workspace::new(-1.0, 10.0),
            ..EngineConfig::default()
        };
        assert!(matches!(Session::new(config), Err(SessionError::Engine(_))));
    }

    #[test]
    fn empty_detection_leaves_session_unchanged() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        let before = s.contours().to_vec();

        let blank = ReferenceRaster::new(
            Raster::from_vec::<u8>(50, 50, 3, vec![0; 50 * 50 * 3]).unwrap(),
        );
        let result = s.load_background(blank);
        assert!(matches!(result, Err(SessionError::NoObjects { .. })));
        assert_eq!(s.contours(), before.as_slice());
        assert_eq!(s.current_background().unwrap().dimensions().width, 400);
    }

    #[test]
    fn background_sets_scale_and_contours() {
        let mut s = session();
        let summary = s.load_background(four_objects()).unwrap();
        assert_eq!(summary.contours, 4);
        assert!(summary.inverted);
        let mmpp = s.background_mm_per_pixel().unwrap();
        assert!((mmpp.x - 1.0).abs() < 1e-12);
        assert_eq!(s.contours().len(), 4);
    }

    #[test]
    fn tile_scale_follows_physical_size() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        // 25.4 dpi: one tile pixel is 1 mm, background pixel is 1 mm.
        let id = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        let tile = s.tile(id).unwrap();
        assert!((tile.scale.sx - 1.0).abs() < 1e-12);
        assert_eq!(tile.scene_center(), Point::new(200.0, 200.0));
    }

    #[test]
    fn tile_without_dpi_needs_background() {
        let mut s = session();
        assert!(matches!(
            s.load_tile(cmyk_tile(None)),
            Err(SessionError::UnknownScale)
        ));
        s.load_background(four_objects()).unwrap();
        let id = s.load_tile(cmyk_tile(None)).unwrap();
        assert_eq!(s.tile(id).unwrap().scale, ScaleFactor::IDENTITY);
    }

    #[test]
    fn workspace_change_rescales_about_center() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        let id = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        s.move_tile(id, Point::new(10.0, -5.0)).unwrap();
        let center = s.tile(id).unwrap().scene_center();

        s.set_workspace(Workspace::new(800.0, 200.0)).unwrap();
        let tile = s.tile(id).unwrap();
        // Background pixels are now 2 mm × 0.5 mm.
        assert!((tile.scale.sx - 0.5).abs() < 1e-12);
        assert!((tile.scale.sy - 2.0).abs() < 1e-12);
        assert!(tile.scene_center().distance(center) < 1e-9);
    }

    #[test]
    fn bind_apply_produces_clone_per_other_contour() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        let tile = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        let first = s.contours()[0].id;
        s.align_tile_to_contour(tile, first).unwrap();

        assert_eq!(s.apply_template(), None);
        s.bind_template(tile, first).unwrap();
        assert_eq!(s.apply_template(), Some(3));
        assert_eq!(s.tiles().len(), 4);
        assert_eq!(s.apply_template(), Some(3));
        assert_eq!(s.tiles().len(), 4);
        assert_eq!(s.template_state(), TemplateState::Applied);
    }

    #[test]
    fn rebinding_to_a_clone_survives_apply() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        let tile = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        s.bind_template(tile, s.contours()[0].id).unwrap();
        assert_eq!(s.apply_template(), Some(3));

        let (clone, contour) = s
            .tiles()
            .iter()
            .find_map(|(id, t)| match t.kind {
                TileKind::Clone { contour } => Some((id, contour)),
                TileKind::Primary => None,
            })
            .unwrap();
        s.bind_template(clone, contour).unwrap();
        assert_eq!(s.apply_template(), Some(3));
        assert!(s.tile(clone).is_some());
        assert_eq!(s.template_state(), TemplateState::Applied);
    }

    #[test]
    fn removing_primary_removes_clones() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        let tile = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        s.bind_template(tile, s.contours()[0].id).unwrap();
        s.apply_template();
        let clone = s.tiles().iter().nth(1).map(|(id, _)| id).unwrap();

        s.remove_tile(clone).unwrap();
        assert_eq!(s.tiles().len(), 3);
        s.remove_tile(tile).unwrap();
        assert!(s.tiles().is_empty());
        assert_eq!(s.template_state(), TemplateState::Idle);
    }

    #[test]
    fn rotation_is_normalized() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        let id = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        s.set_tile_rotation(id, 350.0).unwrap();
        s.rotate_tile(id, 20.0).unwrap();
        assert!((s.tile(id).unwrap().rotation - 10.0).abs() < 1e-9);
        assert!(matches!(
            s.rotate_tile(TileId(99), 1.0),
            Err(SessionError::UnknownTile(_))
        ));
    }

    #[test]
    fn clear_background_drops_everything() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        s.clear_background();
        assert!(s.current_background().is_none());
        assert!(s.contours().is_empty());
        assert!(s.tiles().is_empty());
    }

    #[test]
    fn new_background_keeps_primary_and_drops_clones() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        let tile = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        s.bind_template(tile, s.contours()[0].id).unwrap();
        s.apply_template();
        s.load_background(background(&[(100, 100, 60, 30)])).unwrap();
        assert_eq!(s.tiles().len(), 1);
        assert!(s.tile(tile).is_some());
        assert!(s.binding().is_none());
        // Ids are never reused.
        assert!(s.contours()[0].id.0 >= 4);
    }

    #[test]
    fn render_uses_tile_dpi() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        let out = s.render().unwrap();
        assert_eq!(
            out.canvas.raster.dimensions(),
            Dimensions {
                width: 400,
                height: 400
            }
        );
        assert_eq!(out.composited, 1);
        let meta = s.output_metadata().unwrap();
        assert_eq!(meta.color_model, ColorModel::Separated);
    }

    #[test]
    fn render_without_dpi_fails() {
        let mut s = session();
        s.load_background(four_objects()).unwrap();
        s.load_tile(cmyk_tile(None)).unwrap();
        assert!(matches!(s.render(), Err(SessionError::MissingDpi)));
    }

    #[test]
    fn render_without_tiles_fails() {
        let s = session();
        assert!(matches!(s.render(), Err(SessionError::NoTile)));
    }

    #[test]
    fn observers_see_changes() {
        let mut s = session();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        s.subscribe(move |e| sink.borrow_mut().push(e.kind));

        s.load_background(four_objects()).unwrap();
        let id = s.load_tile(cmyk_tile(Some(25.4))).unwrap();
        s.move_tile(id, Point::new(1.0, 1.0)).unwrap();
        s.clear_background();

        assert_eq!(
            *seen.borrow(),
            vec![
                ChangeKind::BackgroundLoaded,
                ChangeKind::TileLoaded,
                ChangeKind::TileMoved,
                ChangeKind::BackgroundCleared,
            ]
        );
    }
}
