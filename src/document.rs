use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use crate::color::{Material, NoiseDirection, Rgba, apply_material_noise};
use crate::composite::{self, LayerSlice};
use crate::grid::{PixelGrid, SKIN_SIZE};
use crate::mirror::{GroupMeta, LayerMeta, MirrorHandle};
use crate::topology::ModelVariant;

// ============================================================================
// ENTITIES
// ============================================================================

/// How a layer's pixels relate to its base color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LayerType {
    /// The layer conceptually shows `base_color` everywhere it has pixels;
    /// the grid holds a cached rendering of that intent (base color plus
    /// material noise).
    SingleColor,
    /// Arbitrary per-pixel color chosen by the user's drawing color.
    #[default]
    Direct,
}

impl LayerType {
    pub fn to_u8(&self) -> u8 {
        match self {
            LayerType::SingleColor => 0,
            LayerType::Direct => 1,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LayerType::SingleColor,
            _ => LayerType::Direct,
        }
    }
}

/// Noise applied when re-rendering a single-color layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NoiseSettings {
    /// 0–100.
    pub brightness: u8,
    /// 0–100.
    pub hue: u8,
    pub material: Material,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub base_color: Rgba,
    pub noise: NoiseSettings,
    pub group_id: Option<Uuid>,
    /// Relative sort priority within the containing group (or the ungrouped
    /// root); smaller = more foreground.
    pub order: f64,
    pub layer_type: LayerType,
    pub visible: bool,
    /// 0–100.
    pub opacity: u8,
    /// Exclusively owned by this layer; duplication always deep-copies.
    pub pixels: PixelGrid,
}

impl Layer {
    pub fn new(name: String, base_color: Rgba, layer_type: LayerType, order: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            base_color,
            noise: NoiseSettings::default(),
            group_id: None,
            order,
            layer_type,
            visible: true,
            opacity: 100,
            pixels: PixelGrid::new(),
        }
    }

    /// True when everything except the pixel grid matches.
    pub fn metadata_eq(&self, other: &Layer) -> bool {
        self.name == other.name
            && self.base_color == other.base_color
            && self.noise == other.noise
            && self.group_id == other.group_id
            && self.order == other.order
            && self.layer_type == other.layer_type
            && self.visible == other.visible
            && self.opacity == other.opacity
    }

    /// Copy metadata from `other`, leaving the pixel grid untouched.
    pub(crate) fn apply_metadata(&mut self, other: &Layer) {
        self.name = other.name.clone();
        self.base_color = other.base_color;
        self.noise = other.noise;
        self.group_id = other.group_id;
        self.order = other.order;
        self.layer_type = other.layer_type;
        self.visible = other.visible;
        self.opacity = other.opacity;
    }

    /// Re-render every set pixel from the base color plus material noise.
    /// The grid is the cached rendering of a single-color layer's intent, so
    /// this runs whenever base color or noise settings change.
    pub fn repaint_from_base<R: Rng>(&mut self, rng: &mut R) {
        let coords: Vec<(u32, u32)> = self.pixels.iter_set().map(|(x, y, _)| (x, y)).collect();
        for (x, y) in coords {
            let c = apply_material_noise(
                self.base_color,
                self.noise.brightness,
                self.noise.hue,
                NoiseDirection::Both,
                NoiseDirection::Both,
                self.noise.material,
                rng,
            );
            self.pixels.set(x, y, Some(Rgba { a: 255, ..c }));
        }
    }
}

/// Ordering/visibility container for layers. (`collapsed` is a pure UI
/// concern and not part of the model.)
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGroup {
    pub id: Uuid,
    pub name: String,
    pub order: f64,
    pub visible: bool,
}

impl LayerGroup {
    pub fn new(name: String, order: f64) -> Self {
        Self { id: Uuid::new_v4(), name, order, visible: true }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaletteEntry {
    pub id: Uuid,
    pub color: Rgba,
    pub name: Option<String>,
}

/// Deep clone of the undoable state, stashed before a logical user action
/// and consumed by the history engine's diff pass.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    pub layers: Vec<Layer>,
    pub groups: Vec<LayerGroup>,
}

// ============================================================================
// DOCUMENT — the authoritative layer/group state container
// ============================================================================

/// Owns the layer stack, groups, palette and active-tool state, plus the two
/// pieces of derived state: the cached composite (dirty-flag discipline) and
/// the monotonically increasing preview version that downstream consumers
/// watch as a pure change-notification token.
#[derive(Debug)]
pub struct Document {
    width: u32,
    height: u32,
    pub variant: ModelVariant,
    layers: Vec<Layer>,
    groups: Vec<LayerGroup>,
    pub palette: Vec<PaletteEntry>,

    // -- active tool state ----------------------------------------------
    pub active_layer: Option<Uuid>,
    pub drawing_color: Rgba,
    /// When enabled, strokes never overwrite pixels that are already set.
    pub preserve_pixels: bool,

    // -- derived state ----------------------------------------------------
    composite_cache: Option<Arc<Vec<u8>>>,
    preview_version: u64,

    /// Pre-mutation state held between `take_snapshot` and the history
    /// engine's diff pass. An explicit field, never hidden global state.
    pending_snapshot: Option<DocumentSnapshot>,

    /// Optional write-through mirror on the offload worker.
    mirror: Option<MirrorHandle>,
}

impl Document {
    pub fn new(variant: ModelVariant) -> Self {
        Self {
            width: SKIN_SIZE,
            height: SKIN_SIZE,
            variant,
            layers: Vec::new(),
            groups: Vec::new(),
            palette: Vec::new(),
            active_layer: None,
            drawing_color: Rgba::opaque(0, 0, 0),
            preserve_pixels: false,
            composite_cache: None,
            preview_version: 0,
            pending_snapshot: None,
            mirror: None,
        }
    }

    // ---- accessors ----------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn groups(&self) -> &[LayerGroup] {
        &self.groups
    }

    pub fn layer(&self, id: Uuid) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn group(&self, id: Uuid) -> Option<&LayerGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub(crate) fn layer_mut(&mut self, id: Uuid) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    fn group_mut(&mut self, id: Uuid) -> Option<&mut LayerGroup> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    /// Change-notification token; bumped on every mutation. Consumers must
    /// treat it as opaque.
    pub fn preview_version(&self) -> u64 {
        self.preview_version
    }

    /// A layer contributes to the composite iff it is visible and its group
    /// (when it has one) is visible.
    pub fn layer_effectively_visible(&self, id: Uuid) -> bool {
        match self.layer(id) {
            Some(l) => {
                l.visible
                    && l.group_id
                        .map_or(true, |g| self.group(g).map_or(true, |grp| grp.visible))
            }
            None => false,
        }
    }

    // ---- snapshot / dirty bookkeeping ---------------------------------------

    /// Stash the current state for the history engine. Called at the start
    /// of each logical user action; mutating operations call it themselves
    /// so no edit can slip past the diff.
    pub fn take_snapshot(&mut self) {
        if self.pending_snapshot.is_none() {
            self.pending_snapshot = Some(DocumentSnapshot {
                layers: self.layers.clone(),
                groups: self.groups.clone(),
            });
        }
    }

    pub(crate) fn take_pending_snapshot(&mut self) -> Option<DocumentSnapshot> {
        self.pending_snapshot.take()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.composite_cache = None;
        self.preview_version += 1;
    }

    // ---- compositing --------------------------------------------------------

    /// The flattened RGBA image (row-major, top-to-bottom, RGBA8). Cached;
    /// repeated reads without intervening mutation return the same buffer.
    pub fn composite(&mut self) -> Arc<Vec<u8>> {
        if let Some(ref cached) = self.composite_cache {
            return Arc::clone(cached);
        }
        let slices = self.layer_slices();
        let fresh = Arc::new(composite::flatten(self.width, self.height, &slices));
        self.composite_cache = Some(Arc::clone(&fresh));
        fresh
    }

    pub(crate) fn layer_slices(&self) -> Vec<LayerSlice<'_>> {
        self.layers
            .iter()
            .map(|l| LayerSlice {
                grid: &l.pixels,
                order: l.order,
                group: l
                    .group_id
                    .and_then(|g| self.group(g))
                    .map(|g| (g.order, g.visible)),
                visible: l.visible,
                opacity: l.opacity,
            })
            .collect()
    }

    // ---- pixel operations ---------------------------------------------------

    /// Paint the current drawing color onto the active layer. Auto-creates a
    /// `Direct` layer when none is active. Out-of-range coordinates are
    /// silently ignored; in preserve-pixels mode, writes onto already-set
    /// pixels are silently dropped.
    pub fn set_pixel(&mut self, x: u32, y: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.take_snapshot();
        let color = self.drawing_color;
        let layer_id = self.ensure_active_layer();
        let Some(layer) = self.layer(layer_id) else { return };
        if self.preserve_pixels && layer.pixels.is_opaque(x, y) {
            return;
        }
        self.write_layer_pixel(layer_id, x, y, Some(color));
    }

    /// Paint the current drawing color over a rectangle on the active layer,
    /// clipped to the canvas. Same auto-create and preserve-pixels rules as
    /// [`set_pixel`](Self::set_pixel).
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.take_snapshot();
        let color = self.drawing_color;
        let preserve = self.preserve_pixels;
        let layer_id = self.ensure_active_layer();
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y..y_end {
            for px in x..x_end {
                if preserve
                    && self.layer(layer_id).is_some_and(|l| l.pixels.is_opaque(px, py))
                {
                    continue;
                }
                self.write_layer_pixel(layer_id, px, py, Some(color));
            }
        }
    }

    /// Erase the pixel on the active layer. No-op without an active layer.
    pub fn erase_pixel(&mut self, x: u32, y: u32) {
        let Some(layer_id) = self.active_layer else { return };
        if self.layer(layer_id).is_none() {
            return;
        }
        self.take_snapshot();
        self.write_layer_pixel(layer_id, x, y, None);
    }

    /// Write one pixel of one layer, forwarding to the mirror. Callers are
    /// responsible for snapshotting first.
    pub(crate) fn write_layer_pixel(
        &mut self,
        layer_id: Uuid,
        x: u32,
        y: u32,
        pixel: Option<Rgba>,
    ) {
        let Some(layer) = self.layer_mut(layer_id) else { return };
        layer.pixels.set(x, y, pixel);
        if let Some(ref mirror) = self.mirror {
            mirror.forward_set_pixel(layer_id, x, y, pixel);
        }
        self.mark_dirty();
    }

    /// Pixel write without mirror forwarding. Undo/redo replays through this
    /// and then pushes whole grids, so incremental forwarding would only
    /// duplicate traffic.
    pub(crate) fn set_layer_pixel_silent(
        &mut self,
        layer_id: Uuid,
        x: u32,
        y: u32,
        pixel: Option<Rgba>,
    ) {
        if let Some(layer) = self.layer_mut(layer_id) {
            layer.pixels.set(x, y, pixel);
        }
    }

    fn ensure_active_layer(&mut self) -> Uuid {
        if let Some(id) = self.active_layer
            && self.layer(id).is_some()
        {
            return id;
        }
        let name = format!("layer-{}", self.layers.len() + 1);
        let id = self.add_layer(name, self.drawing_color, LayerType::Direct);
        self.active_layer = Some(id);
        id
    }

    // ---- layer CRUD ---------------------------------------------------------

    /// Append a new empty layer, ungrouped, at the end of the global order
    /// sequence (i.e. behind everything else).
    pub fn add_layer(&mut self, name: String, base_color: Rgba, layer_type: LayerType) -> Uuid {
        self.take_snapshot();
        let order = self.next_order(None);
        let layer = Layer::new(name, base_color, layer_type, order);
        let id = layer.id;
        self.layers.push(layer);
        self.push_layer_to_mirror(id);
        self.sync_mirror_meta();
        self.mark_dirty();
        id
    }

    /// Adopt a fully-built layer (segmentation and split results arrive this
    /// way). The layer keeps its own id/order/group assignment.
    pub(crate) fn adopt_layer(&mut self, layer: Layer) -> Uuid {
        let id = layer.id;
        self.layers.push(layer);
        self.push_layer_to_mirror(id);
        self.sync_mirror_meta();
        self.mark_dirty();
        id
    }

    /// Delete a layer. Unknown ids are a no-op (a dialog may still reference
    /// a just-deleted layer).
    pub fn remove_layer(&mut self, id: Uuid) {
        let Some(idx) = self.layers.iter().position(|l| l.id == id) else { return };
        self.take_snapshot();
        self.layers.remove(idx);
        if self.active_layer == Some(id) {
            self.active_layer = None;
        }
        if let Some(ref mirror) = self.mirror {
            mirror.remove_layer(id);
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    /// Deep-copy a layer (new id, cloned grid and noise settings), placed
    /// ungrouped at the end of the global order sequence.
    pub fn duplicate_layer(&mut self, id: Uuid) -> Option<Uuid> {
        let source = self.layer(id)?.clone();
        self.take_snapshot();
        let mut copy = source;
        copy.id = Uuid::new_v4();
        copy.name = format!("{} copy", copy.name);
        copy.group_id = None;
        copy.order = self.next_order(None);
        let new_id = copy.id;
        self.layers.push(copy);
        self.push_layer_to_mirror(new_id);
        self.sync_mirror_meta();
        self.mark_dirty();
        Some(new_id)
    }

    pub fn set_layer_visible(&mut self, id: Uuid, visible: bool) {
        if self.layer(id).is_none() {
            return;
        }
        self.take_snapshot();
        if let Some(layer) = self.layer_mut(id) {
            layer.visible = visible;
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub fn set_layer_opacity(&mut self, id: Uuid, opacity: u8) {
        if self.layer(id).is_none() {
            return;
        }
        self.take_snapshot();
        if let Some(layer) = self.layer_mut(id) {
            layer.opacity = opacity.min(100);
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub fn rename_layer(&mut self, id: Uuid, name: String) {
        if self.layer(id).is_none() {
            return;
        }
        self.take_snapshot();
        if let Some(layer) = self.layer_mut(id) {
            layer.name = name;
        }
        self.mark_dirty();
    }

    /// Change a layer's base color. Single-color layers re-render their grid
    /// from the new base (plus noise), so the cached pixels stay in sync.
    pub fn set_layer_base_color(&mut self, id: Uuid, color: Rgba) {
        if self.layer(id).is_none() {
            return;
        }
        self.take_snapshot();
        let mut rng = rand::thread_rng();
        if let Some(layer) = self.layer_mut(id) {
            layer.base_color = color;
            if layer.layer_type == LayerType::SingleColor {
                layer.repaint_from_base(&mut rng);
            }
        }
        self.push_layer_to_mirror(id);
        self.mark_dirty();
    }

    pub fn set_layer_noise(&mut self, id: Uuid, noise: NoiseSettings) {
        if self.layer(id).is_none() {
            return;
        }
        self.take_snapshot();
        let mut rng = rand::thread_rng();
        if let Some(layer) = self.layer_mut(id) {
            layer.noise = noise;
            if layer.layer_type == LayerType::SingleColor {
                layer.repaint_from_base(&mut rng);
            }
        }
        self.push_layer_to_mirror(id);
        self.mark_dirty();
    }

    pub fn set_layer_type(&mut self, id: Uuid, layer_type: LayerType) {
        if self.layer(id).is_none() {
            return;
        }
        self.take_snapshot();
        let mut rng = rand::thread_rng();
        if let Some(layer) = self.layer_mut(id) {
            layer.layer_type = layer_type;
            if layer_type == LayerType::SingleColor {
                layer.repaint_from_base(&mut rng);
            }
        }
        self.push_layer_to_mirror(id);
        self.mark_dirty();
    }

    // ---- ordering / grouping ------------------------------------------------

    /// Assign a new order value to a layer. The caller computes the value
    /// (midpoint insertion between the intended neighbors).
    pub fn reorder_layer(&mut self, id: Uuid, new_order: f64) {
        if self.layer(id).is_none() {
            return;
        }
        self.take_snapshot();
        if let Some(layer) = self.layer_mut(id) {
            layer.order = new_order;
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub fn reorder_group(&mut self, id: Uuid, new_order: f64) {
        if self.group(id).is_none() {
            return;
        }
        self.take_snapshot();
        if let Some(group) = self.group_mut(id) {
            group.order = new_order;
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    /// Reassign group membership, appending at the end of the target
    /// container's order sequence.
    pub fn move_layer_to_group(&mut self, layer_id: Uuid, group_id: Option<Uuid>) {
        if self.layer(layer_id).is_none() {
            return;
        }
        if let Some(gid) = group_id
            && self.group(gid).is_none()
        {
            return;
        }
        self.take_snapshot();
        let order = self.next_order(group_id);
        if let Some(layer) = self.layer_mut(layer_id) {
            layer.group_id = group_id;
            layer.order = order;
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    /// Rewrite every order value in every container to small consecutive
    /// integers. Explicit maintenance operation; midpoint insertion erodes
    /// float precision after many reorders.
    pub fn normalize_orders(&mut self) {
        self.take_snapshot();
        let mut group_ids: Vec<Option<Uuid>> =
            self.groups.iter().map(|g| Some(g.id)).collect();
        group_ids.push(None);
        for gid in group_ids {
            let mut member_ids: Vec<Uuid> = self
                .layers
                .iter()
                .filter(|l| l.group_id == gid)
                .map(|l| l.id)
                .collect();
            member_ids.sort_by(|a, b| {
                let oa = self.layer(*a).map(|l| l.order).unwrap_or(0.0);
                let ob = self.layer(*b).map(|l| l.order).unwrap_or(0.0);
                oa.partial_cmp(&ob).unwrap_or(std::cmp::Ordering::Equal)
            });
            for (i, id) in member_ids.into_iter().enumerate() {
                if let Some(layer) = self.layer_mut(id) {
                    layer.order = i as f64;
                }
            }
        }
        let mut ids: Vec<Uuid> = self.groups.iter().map(|g| g.id).collect();
        ids.sort_by(|a, b| {
            let oa = self.group(*a).map(|g| g.order).unwrap_or(0.0);
            let ob = self.group(*b).map(|g| g.order).unwrap_or(0.0);
            oa.partial_cmp(&ob).unwrap_or(std::cmp::Ordering::Equal)
        });
        for (i, id) in ids.into_iter().enumerate() {
            if let Some(group) = self.group_mut(id) {
                group.order = i as f64;
            }
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    /// `max(order in container) + 1`, or 0 for an empty container.
    pub fn next_order(&self, group_id: Option<Uuid>) -> f64 {
        self.layers
            .iter()
            .filter(|l| l.group_id == group_id)
            .map(|l| l.order)
            .fold(None::<f64>, |acc, o| Some(acc.map_or(o, |a| a.max(o))))
            .map_or(0.0, |max| max + 1.0)
    }

    // ---- group CRUD ---------------------------------------------------------

    pub fn add_group(&mut self, name: String) -> Uuid {
        self.take_snapshot();
        let order = self
            .groups
            .iter()
            .map(|g| g.order)
            .fold(None::<f64>, |acc, o| Some(acc.map_or(o, |a| a.max(o))))
            .map_or(0.0, |max| max + 1.0);
        let group = LayerGroup::new(name, order);
        let id = group.id;
        self.groups.push(group);
        self.sync_mirror_meta();
        self.mark_dirty();
        id
    }

    /// Delete the group but keep its member layers — they become ungrouped.
    pub fn delete_group(&mut self, id: Uuid) {
        let Some(idx) = self.groups.iter().position(|g| g.id == id) else { return };
        self.take_snapshot();
        self.groups.remove(idx);
        for layer in &mut self.layers {
            if layer.group_id == Some(id) {
                layer.group_id = None;
            }
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub fn set_group_visible(&mut self, id: Uuid, visible: bool) {
        if self.group(id).is_none() {
            return;
        }
        self.take_snapshot();
        if let Some(group) = self.group_mut(id) {
            group.visible = visible;
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub fn rename_group(&mut self, id: Uuid, name: String) {
        if self.group(id).is_none() {
            return;
        }
        self.take_snapshot();
        if let Some(group) = self.group_mut(id) {
            group.name = name;
        }
        self.mark_dirty();
    }

    // ---- palette ------------------------------------------------------------

    pub fn add_palette_entry(&mut self, color: Rgba, name: Option<String>) -> Uuid {
        let entry = PaletteEntry { id: Uuid::new_v4(), color, name };
        let id = entry.id;
        self.palette.push(entry);
        id
    }

    pub fn remove_palette_entry(&mut self, id: Uuid) {
        self.palette.retain(|e| e.id != id);
    }

    // ---- history replay hooks (no snapshotting) -----------------------------

    pub(crate) fn insert_layer_raw(&mut self, layer: Layer) {
        let id = layer.id;
        self.layers.push(layer);
        self.push_layer_to_mirror(id);
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub(crate) fn remove_layer_raw(&mut self, id: Uuid) {
        self.layers.retain(|l| l.id != id);
        if self.active_layer == Some(id) {
            self.active_layer = None;
        }
        if let Some(ref mirror) = self.mirror {
            mirror.remove_layer(id);
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub(crate) fn apply_layer_metadata(&mut self, meta: &Layer) {
        if let Some(layer) = self.layer_mut(meta.id) {
            layer.apply_metadata(meta);
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub(crate) fn insert_group_raw(&mut self, group: LayerGroup) {
        self.groups.push(group);
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub(crate) fn remove_group_raw(&mut self, id: Uuid) {
        self.groups.retain(|g| g.id != id);
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    pub(crate) fn apply_group_metadata(&mut self, meta: &LayerGroup) {
        if let Some(group) = self.group_mut(meta.id) {
            *group = meta.clone();
        }
        self.sync_mirror_meta();
        self.mark_dirty();
    }

    // ---- offload mirror -----------------------------------------------------

    /// Attach a write-through mirror. The full current state is pushed so the
    /// mirror starts consistent.
    pub fn attach_mirror(&mut self, mirror: MirrorHandle) {
        self.mirror = Some(mirror);
        let ids: Vec<Uuid> = self.layers.iter().map(|l| l.id).collect();
        for id in ids {
            self.push_layer_to_mirror(id);
        }
        self.sync_mirror_meta();
    }

    pub fn mirror(&self) -> Option<&MirrorHandle> {
        self.mirror.as_ref()
    }

    pub fn mirror_mut(&mut self) -> Option<&mut MirrorHandle> {
        self.mirror.as_mut()
    }

    /// Full-grid replacement push; used by rebuild operations (segmentation,
    /// merge, split, undo/redo) instead of drift-prone per-pixel forwarding.
    pub(crate) fn push_layer_to_mirror(&self, id: Uuid) {
        if let Some(ref mirror) = self.mirror
            && let Some(layer) = self.layer(id)
        {
            mirror.replace_layer(
                id,
                layer.pixels.width(),
                layer.pixels.height(),
                layer.pixels.to_bytes(),
            );
        }
    }

    pub(crate) fn sync_mirror_meta(&self) {
        let Some(ref mirror) = self.mirror else { return };
        let layers = self
            .layers
            .iter()
            .map(|l| LayerMeta {
                id: l.id,
                order: l.order,
                group_id: l.group_id,
                visible: l.visible,
                opacity: l.opacity,
            })
            .collect();
        let groups = self
            .groups
            .iter()
            .map(|g| GroupMeta { id: g.id, order: g.order, visible: g.visible })
            .collect();
        mirror.sync_meta(layers, groups);
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(ModelVariant::Wide)
    }
}

// ============================================================================
// TESTS
// ============================================================================
