//! Placed tiles and the template engine that replicates one placement
//! onto every detected object.
//!
//! A [`TemplateBinding`] captures how one tile sits relative to one
//! contour. Applying it re-creates that relationship on every other
//! contour, rotating the stored offset with each target's orientation.
//! Clones share the template's pixels through an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{ContourGeometry, normalize_degrees};
use crate::raster::TileImage;
use crate::types::{MmPerPixel, Point, ScaleFactor};

/// Stable identifier of a detected contour within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContourId(pub u32);

/// Stable identifier of a placed tile within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId(pub u32);

/// How a placed tile came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    /// Created by loading a tile.
    Primary,
    /// Created by applying the template to a contour.
    Clone {
        /// The contour this copy was placed on.
        contour: ContourId,
    },
}

/// One instance of a tile in the scene.
///
/// `position` is the top-left corner of the scaled, unrotated tile in
/// scene coordinates; rotation is about the tile's own center.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedTile {
    /// Shared, read-only pixels.
    pub source: Arc<TileImage>,
    /// Top-left corner of the unrotated tile box (scene pixels).
    pub position: Point,
    /// Clockwise rotation in degrees about the tile center.
    pub rotation: f64,
    /// Scene pixels per tile pixel.
    pub scale: ScaleFactor,
    /// Physical size of one tile pixel.
    pub mm_per_pixel: MmPerPixel,
    /// Primary tile or template clone.
    pub kind: TileKind,
}

impl PlacedTile {
    /// A primary tile centered on `center`.
    #[must_use]
    pub fn primary(
        source: Arc<TileImage>,
        center: Point,
        scale: ScaleFactor,
        mm_per_pixel: MmPerPixel,
    ) -> Self {
        let mut tile = Self {
            source,
            position: Point::default(),
            rotation: 0.0,
            scale,
            mm_per_pixel,
            kind: TileKind::Primary,
        };
        tile.set_center(center);
        tile
    }

    /// Size of the tile in scene pixels.
    #[must_use]
    pub fn scaled_size(&self) -> (f64, f64) {
        (
            f64::from(self.source.raster.width()) * self.scale.sx,
            f64::from(self.source.raster.height()) * self.scale.sy,
        )
    }

    /// Half of [`scaled_size`](Self::scaled_size) as a vector.
    #[must_use]
    pub fn half_extent(&self) -> Point {
        let (w, h) = self.scaled_size();
        Point::new(w / 2.0, h / 2.0)
    }

    /// Center of the tile in scene coordinates.
    #[must_use]
    pub fn scene_center(&self) -> Point {
        self.position + self.half_extent()
    }

    /// Move the tile so its center lands on `center`.
    pub fn set_center(&mut self, center: Point) {
        self.position = center - self.half_extent();
    }

    /// The four corners of the rotated tile in scene coordinates.
    #[must_use]
    pub fn footprint(&self) -> [Point; 4] {
        let c = self.scene_center();
        let h = self.half_extent();
        [
            Point::new(-h.x, -h.y),
            Point::new(h.x, -h.y),
            Point::new(h.x, h.y),
            Point::new(-h.x, h.y),
        ]
        .map(|p| p.rotated(self.rotation) + c)
    }
}

/// Placed tiles keyed by id, iterated in creation order.
#[derive(Debug, Clone, Default)]
pub struct TileSet {
    tiles: BTreeMap<TileId, PlacedTile>,
    next_id: u32,
}

impl TileSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tile and return its new id.
    pub fn insert(&mut self, tile: PlacedTile) -> TileId {
        let id = TileId(self.next_id);
        self.next_id += 1;
        self.tiles.insert(id, tile);
        id
    }

    /// Look up a tile.
    #[must_use]
    pub fn get(&self, id: TileId) -> Option<&PlacedTile> {
        self.tiles.get(&id)
    }

    /// Look up a tile for editing.
    pub fn get_mut(&mut self, id: TileId) -> Option<&mut PlacedTile> {
        self.tiles.get_mut(&id)
    }

    /// Remove a tile, returning it.
    pub fn remove(&mut self, id: TileId) -> Option<PlacedTile> {
        self.tiles.remove(&id)
    }

    /// Remove every tile.
    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    /// Number of tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Returns `true` if there are no tiles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tiles in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (TileId, &PlacedTile)> {
        self.tiles.iter().map(|(&id, tile)| (id, tile))
    }

    /// Mutable access to every tile, in creation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TileId, &mut PlacedTile)> {
        self.tiles.iter_mut().map(|(&id, tile)| (id, tile))
    }

    /// The primary tile, if one is loaded.
    #[must_use]
    pub fn primary(&self) -> Option<(TileId, &PlacedTile)> {
        self.iter().find(|(_, t)| t.kind == TileKind::Primary)
    }
}

/// Offset between a template tile and the contour it was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemplateBinding {
    /// The template tile.
    pub tile: TileId,
    /// The contour the template was bound to.
    pub contour: ContourId,
    /// `normalize(360 - contour.angle + tile.rotation)`.
    pub angle_offset: f64,
    /// `contour.center - tile.scene_center`.
    pub pos_offset: Point,
    /// Tile center relative to the contour center, expressed in the
    /// tile's unrotated frame.
    pub local_offset: Point,
}

impl TemplateBinding {
    /// Capture the relationship between `tile` and `contour`.
    #[must_use]
    pub fn new(
        tile_id: TileId,
        tile: &PlacedTile,
        contour_id: ContourId,
        contour: &ContourGeometry,
    ) -> Self {
        let pos_offset = contour.center() - tile.scene_center();
        let zero = Point::default();
        Self {
            tile: tile_id,
            contour: contour_id,
            angle_offset: normalize_degrees(360.0 - contour.angle() + tile.rotation),
            pos_offset,
            local_offset: (zero - pos_offset).rotated(-tile.rotation),
        }
    }

    /// Rotation and top-left position of a copy of `template` placed on
    /// `contour`.
    #[must_use]
    pub fn placement_for(&self, template: &PlacedTile, contour: &ContourGeometry) -> (f64, Point) {
        let angle = normalize_degrees(contour.angle() + self.angle_offset);
        let offset = self.local_offset.rotated(angle);
        let position = contour.center() - template.half_extent() + offset;
        (angle, position)
    }
}

/// Lifecycle of the template engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateState {
    /// Nothing bound.
    Idle,
    /// A binding exists but has not been applied since it was made.
    TemplateBound,
    /// The current binding has been applied.
    Applied,
}

/// Creates and refreshes template clones.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine {
    binding: Option<TemplateBinding>,
    applied: bool,
    clones: Vec<TileId>,
}

impl TemplateEngine {
    /// An idle engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tile` to `contour`, replacing any earlier binding.
    ///
    /// Binding a clone takes it out of the clone list, so the next apply
    /// keeps it as the template instead of removing it.
    pub fn create(
        &mut self,
        tile_id: TileId,
        tile: &PlacedTile,
        contour_id: ContourId,
        contour: &ContourGeometry,
    ) -> TemplateBinding {
        let binding = TemplateBinding::new(tile_id, tile, contour_id, contour);
        tracing::debug!(
            tile = tile_id.0,
            contour = contour_id.0,
            angle_offset = binding.angle_offset,
            "template bound"
        );
        self.clones.retain(|&c| c != tile_id);
        self.binding = Some(binding);
        self.applied = false;
        binding
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TemplateState {
        match (&self.binding, self.applied) {
            (None, _) => TemplateState::Idle,
            (Some(_), false) => TemplateState::TemplateBound,
            (Some(_), true) => TemplateState::Applied,
        }
    }

    /// The active binding.
    #[must_use]
    pub const fn binding(&self) -> Option<&TemplateBinding> {
        self.binding.as_ref()
    }

    /// Ids of the clones created by the last apply.
    #[must_use]
    pub fn clones(&self) -> &[TileId] {
        &self.clones
    }

    /// Place a copy of the template tile on every contour except the
    /// bound one.
    ///
    /// Clones from an earlier apply are removed first, so applying twice
    /// yields the same placements. Returns the number of clones, or
    /// `None` when nothing is bound or the template tile no longer
    /// exists.
    pub fn apply_template<'a, I>(&mut self, tiles: &mut TileSet, contours: I) -> Option<usize>
    where
        I: IntoIterator<Item = (ContourId, &'a ContourGeometry)>,
    {
        let Some(binding) = self.binding else {
            tracing::debug!("apply requested with no template bound");
            return None;
        };

        self.remove_clones(tiles);

        let Some(template) = tiles.get(binding.tile).cloned() else {
            tracing::warn!(tile = binding.tile.0, "template tile is gone, dropping binding");
            self.binding = None;
            self.applied = false;
            return None;
        };

        for (contour_id, contour) in contours {
            if contour_id == binding.contour {
                continue;
            }
            let (rotation, position) = binding.placement_for(&template, contour);
            let clone = PlacedTile {
                source: Arc::clone(&template.source),
                position,
                rotation,
                scale: template.scale,
                mm_per_pixel: template.mm_per_pixel,
                kind: TileKind::Clone {
                    contour: contour_id,
                },
            };
            self.clones.push(tiles.insert(clone));
        }

        self.applied = true;
        tracing::info!(clones = self.clones.len(), "template applied");
        Some(self.clones.len())
    }

    /// Forget a clone that was deleted individually.
    pub fn forget_clone(&mut self, id: TileId) {
        self.clones.retain(|&c| c != id);
    }

    /// Remove all clones and drop the binding.
    pub fn clear(&mut self, tiles: &mut TileSet) {
        self.remove_clones(tiles);
        self.binding = None;
        self.applied = false;
    }

    fn remove_clones(&mut self, tiles: &mut TileSet) {
        for id in self.clones.drain(..) {
            tiles.remove(id);
        }
    }
}
