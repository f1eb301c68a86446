use std::collections::HashMap;

use rand::Rng;
use uuid::Uuid;

use crate::color::{Rgba, are_similar};
use crate::document::{Document, Layer, LayerType, NoiseSettings};
use crate::grid::PixelGrid;
use crate::topology::{ModelVariant, PartKey, SkinTopology};
use crate::log_info;

// ============================================================================
// SEGMENTATION — cluster a flat skin image into candidate layers
// ============================================================================
//
// Two pixels land in the same cluster when they are connected through a chain
// of similar-colored neighbors, where "neighbor" means either 2D atlas
// adjacency (including diagonals) or declared 3D adjacency across a UV seam.
// Clusters never cross a body-part + UV-layer boundary: the hat shell and the
// head base are separate even where their atlas rectangles touch.

/// Tuning for one segmentation run.
#[derive(Clone, Copy, Debug)]
pub struct SegmentOptions {
    /// Euclidean RGB distance below which two pixels count as the same
    /// color. 0 = exact match only, ~441 = everything matches.
    pub threshold: f32,
    /// Derive per-layer noise defaults from the threshold: a looser
    /// threshold averaged away more real variation, so re-expansion gets
    /// more synthetic noise back.
    pub apply_noise_from_threshold: bool,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self { threshold: 30.0, apply_noise_from_threshold: false }
    }
}

/// Union-find over pixel indices, union by rank with path compression.
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), rank: vec![0; n] }
    }

    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression.
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// One connected component of the segmentation: its part key and member
/// pixel coordinates, in scan order.
struct Component {
    key: PartKey,
    pixels: Vec<(u32, u32)>,
}

/// Run the union-find over `grid`, honoring 2D adjacency (4-neighbor plus
/// diagonals via the right / bottom / bottom-right / bottom-left sweep) and
/// the 3D UV edge table. Components are returned sorted by their first pixel
/// in scan order, which makes naming deterministic.
fn connected_components(grid: &PixelGrid, variant: ModelVariant, threshold: f32) -> Vec<Component> {
    let topo = SkinTopology::for_variant(variant);
    let w = grid.width();
    let h = grid.height();
    let idx = |x: u32, y: u32| (y * w + x) as usize;

    // Part key per pixel; pixels outside every region are excluded.
    let mut keys: Vec<Option<PartKey>> = vec![None; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            if grid.is_opaque(x, y) {
                keys[idx(x, y)] = topo.region_at(x, y).map(|r| r.key());
            }
        }
    }

    let mut uf = UnionFind::new((w * h) as usize);

    // 2D pass. Right / bottom / bottom-right / bottom-left cover all eight
    // neighbor directions once the full sweep runs.
    for y in 0..h {
        for x in 0..w {
            let Some(key) = keys[idx(x, y)] else { continue };
            let Some(color) = grid.get(x, y) else { continue };
            let neighbors = [
                (x + 1, y),
                (x, y + 1),
                (x + 1, y + 1),
                (x.wrapping_sub(1), y + 1),
            ];
            for (nx, ny) in neighbors {
                if nx >= w || ny >= h {
                    continue;
                }
                if keys[idx(nx, ny)] != Some(key) {
                    continue;
                }
                let Some(nc) = grid.get(nx, ny) else { continue };
                if are_similar(color, nc, threshold) {
                    uf.union(idx(x, y), idx(nx, ny));
                }
            }
        }
    }

    // 3D pass: walk declared edge pairs in lockstep.
    for conn in &topo.connections {
        let (Some(a), Some(b)) = (topo.region_by_name(conn.face_a), topo.region_by_name(conn.face_b))
        else {
            continue;
        };
        let run_a = SkinTopology::edge_run(a, conn.edge_a);
        let mut run_b = SkinTopology::edge_run(b, conn.edge_b);
        if conn.reversed {
            run_b.reverse();
        }
        for (&(ax, ay), &(bx, by)) in run_a.iter().zip(run_b.iter()) {
            let (Some(ca), Some(cb)) = (grid.get(ax, ay), grid.get(bx, by)) else { continue };
            if are_similar(ca, cb, threshold) {
                uf.union(idx(ax, ay), idx(bx, by));
            }
        }
    }

    // Collect by root, scan order within each component.
    let mut by_root: HashMap<usize, Component> = HashMap::new();
    let mut roots_in_order: Vec<usize> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let Some(key) = keys[idx(x, y)] else { continue };
            let root = uf.find(idx(x, y));
            by_root
                .entry(root)
                .or_insert_with(|| {
                    roots_in_order.push(root);
                    Component { key, pixels: Vec::new() }
                })
                .pixels
                .push((x, y));
        }
    }
    roots_in_order
        .into_iter()
        .filter_map(|root| by_root.remove(&root))
        .collect()
}

/// Average RGB of the component's pixels in `grid`, integer-rounded, alpha
/// fixed to 255.
fn average_color(grid: &PixelGrid, pixels: &[(u32, u32)]) -> Rgba {
    let mut r = 0u32;
    let mut g = 0u32;
    let mut b = 0u32;
    let mut n = 0u32;
    for &(x, y) in pixels {
        if let Some(c) = grid.get(x, y) {
            r += c.r as u32;
            g += c.g as u32;
            b += c.b as u32;
            n += 1;
        }
    }
    if n == 0 {
        return Rgba::opaque(0, 0, 0);
    }
    let avg = |sum: u32| ((sum as f32 / n as f32).round() as u32).min(255) as u8;
    Rgba::opaque(avg(r), avg(g), avg(b))
}

fn noise_from_threshold(threshold: f32) -> NoiseSettings {
    let factor = (threshold / 80.0 * 40.0).round();
    NoiseSettings {
        brightness: (factor.min(50.0)) as u8,
        hue: ((factor * 0.5).round().min(25.0)) as u8,
        material: Default::default(),
    }
}

/// Partition a flat skin image into single-color layers. An empty image
/// yields an empty vector. Layer orders start at 0 and count up in component
/// discovery order (foreground first).
pub fn segment<R: Rng>(
    image: &PixelGrid,
    variant: ModelVariant,
    options: &SegmentOptions,
    rng: &mut R,
) -> Vec<Layer> {
    let components = connected_components(image, variant, options.threshold);
    let noise = options
        .apply_noise_from_threshold
        .then(|| noise_from_threshold(options.threshold));

    let mut layers = Vec::with_capacity(components.len());
    for (seq, component) in components.iter().enumerate() {
        let base = average_color(image, &component.pixels);
        let name = format!("{}-{}", component.key.display_name(), seq + 1);
        let mut layer = Layer::new(name, base, LayerType::SingleColor, seq as f64);
        if let Some(noise) = noise {
            layer.noise = noise;
        }
        for &(x, y) in &component.pixels {
            layer.pixels.set(x, y, Some(base));
        }
        layer.repaint_from_base(rng);
        layers.push(layer);
    }
    log_info!(
        "segment: {} component(s) at threshold {:.0}",
        layers.len(),
        options.threshold
    );
    layers
}

/// Segment an image and adopt the resulting layers into `doc`, appended
/// behind the existing stack. Records as one history action.
pub fn segment_into_document<R: Rng>(
    doc: &mut Document,
    image: &PixelGrid,
    options: &SegmentOptions,
    rng: &mut R,
) -> Vec<Uuid> {
    let layers = segment(image, doc.variant, options, rng);
    if layers.is_empty() {
        return Vec::new();
    }
    doc.take_snapshot();
    let mut ids = Vec::with_capacity(layers.len());
    for mut layer in layers {
        layer.order = doc.next_order(None);
        ids.push(doc.adopt_layer(layer));
    }
    ids
}

// ============================================================================
// SPLITS — re-segment or carve up one existing layer
// ============================================================================

/// Re-run segmentation over one layer's own pixels at a (typically stricter)
/// threshold. The layer is replaced by the resulting components; when only
/// one component comes back there is nothing to split and the document is
/// left untouched (no history entry either). Returns the new layer ids.
pub fn split_layer_by_color<R: Rng>(
    doc: &mut Document,
    layer_id: Uuid,
    threshold: f32,
    rng: &mut R,
) -> Vec<Uuid> {
    let Some(layer) = doc.layer(layer_id) else { return Vec::new() };
    let variant = doc.variant;
    let components = connected_components(&layer.pixels, variant, threshold);
    if components.len() < 2 {
        return Vec::new();
    }

    let source_pixels = layer.pixels.clone();
    let group_id = layer.group_id;
    doc.take_snapshot();
    doc.remove_layer(layer_id);

    let mut ids = Vec::with_capacity(components.len());
    for (seq, component) in components.iter().enumerate() {
        let base = average_color(&source_pixels, &component.pixels);
        let name = format!("{}-{}", component.key.display_name(), seq + 1);
        let mut new_layer =
            Layer::new(name, base, LayerType::SingleColor, doc.next_order(group_id));
        new_layer.group_id = group_id;
        for &(x, y) in &component.pixels {
            new_layer.pixels.set(x, y, Some(base));
        }
        new_layer.repaint_from_base(rng);
        ids.push(doc.adopt_layer(new_layer));
    }
    log_info!("split: layer replaced by {} component(s)", ids.len());
    ids
}

/// Move a user-selected pixel set out of a layer into a brand-new layer
/// colored with the selection's average. Selection entries that are not
/// opaque in the source are silently ignored; an effectively empty
/// selection is a no-op returning `None`.
pub fn split_layer_by_selection(
    doc: &mut Document,
    layer_id: Uuid,
    selection: &[(u32, u32)],
) -> Option<Uuid> {
    let layer = doc.layer(layer_id)?;
    let moved: Vec<(u32, u32, Rgba)> = selection
        .iter()
        .filter_map(|&(x, y)| layer.pixels.get(x, y).map(|c| (x, y, c)))
        .collect();
    if moved.is_empty() {
        return None;
    }

    let group_id = layer.group_id;
    let name = format!("{} split", layer.name);
    doc.take_snapshot();

    let coords: Vec<(u32, u32)> = moved.iter().map(|&(x, y, _)| (x, y)).collect();
    let mut sum = (0u32, 0u32, 0u32);
    for &(_, _, c) in &moved {
        sum = (sum.0 + c.r as u32, sum.1 + c.g as u32, sum.2 + c.b as u32);
    }
    let n = moved.len() as u32;
    let avg = |s: u32| ((s as f32 / n as f32).round() as u32).min(255) as u8;
    let base = Rgba::opaque(avg(sum.0), avg(sum.1), avg(sum.2));

    {
        let layer = doc.layer_mut(layer_id)?;
        for &(x, y) in &coords {
            layer.pixels.clear(x, y);
        }
    }
    doc.push_layer_to_mirror(layer_id);

    let mut new_layer = Layer::new(name, base, LayerType::SingleColor, doc.next_order(group_id));
    new_layer.group_id = group_id;
    for &(x, y) in &coords {
        new_layer.pixels.set(x, y, Some(base));
    }
    Some(doc.adopt_layer(new_layer))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0x5EED)
    }

    fn fill_region(grid: &mut PixelGrid, name: &str, color: Rgba) {
        let topo = SkinTopology::for_variant(ModelVariant::Wide);
        let r = topo.region_by_name(name).unwrap();
        grid.fill_rect(r.x, r.y, r.width, r.height, Some(color));
    }

    #[test]
    fn transparent_image_yields_no_layers() {
        let grid = PixelGrid::new();
        let layers = segment(&grid, ModelVariant::Wide, &SegmentOptions::default(), &mut rng());
        assert!(layers.is_empty());
    }

    #[test]
    fn uniform_face_becomes_one_layer_with_average_color() {
        let mut grid = PixelGrid::new();
        let color = Rgba::opaque(200, 100, 50);
        fill_region(&mut grid, "head-front", color);

        let options = SegmentOptions { threshold: 30.0, apply_noise_from_threshold: false };
        let layers = segment(&grid, ModelVariant::Wide, &options, &mut rng());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].base_color, color);
        assert_eq!(layers[0].pixels.count_set(), 64);
        assert_eq!(layers[0].name, "head-1");
        assert_eq!(layers[0].layer_type, LayerType::SingleColor);
    }

    #[test]
    fn components_never_cross_part_keys() {
        // head-back's last column (x=31) and hat-right's first column (x=32)
        // touch in the atlas but belong to different part keys.
        let mut grid = PixelGrid::new();
        let color = Rgba::opaque(80, 80, 80);
        for y in 8..16 {
            grid.set(31, y, Some(color));
            grid.set(32, y, Some(color));
        }
        let options = SegmentOptions { threshold: 100.0, apply_noise_from_threshold: false };
        let layers = segment(&grid, ModelVariant::Wide, &options, &mut rng());
        assert_eq!(layers.len(), 2);
        let mut names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        names.sort();
        assert_eq!(names, ["head-1", "head-overlay-2"]);
    }

    #[test]
    fn wrap_seam_joins_atlas_disjoint_faces() {
        // head-back's right edge meets head-right's left edge in 3D but the
        // two columns are far apart in the atlas.
        let mut grid = PixelGrid::new();
        let color = Rgba::opaque(10, 120, 240);
        for y in 8..16 {
            grid.set(31, y, Some(color)); // head-back right edge
            grid.set(0, y, Some(color)); // head-right left edge
        }
        let options = SegmentOptions { threshold: 0.0, apply_noise_from_threshold: false };
        let layers = segment(&grid, ModelVariant::Wide, &options, &mut rng());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].pixels.count_set(), 16);
    }

    #[test]
    fn dissimilar_colors_stay_separate() {
        let mut grid = PixelGrid::new();
        grid.set(10, 10, Some(Rgba::opaque(0, 0, 0)));
        grid.set(11, 10, Some(Rgba::opaque(255, 255, 255)));
        let options = SegmentOptions { threshold: 30.0, apply_noise_from_threshold: false };
        let layers = segment(&grid, ModelVariant::Wide, &options, &mut rng());
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn noise_defaults_derive_from_threshold() {
        let mut grid = PixelGrid::new();
        fill_region(&mut grid, "head-front", Rgba::opaque(100, 100, 100));
        let options = SegmentOptions { threshold: 80.0, apply_noise_from_threshold: true };
        let layers = segment(&grid, ModelVariant::Wide, &options, &mut rng());
        assert_eq!(layers[0].noise.brightness, 40);
        assert_eq!(layers[0].noise.hue, 20);

        // Brightness caps at 50, hue at 25.
        let options = SegmentOptions { threshold: 441.0, apply_noise_from_threshold: true };
        let layers = segment(&grid, ModelVariant::Wide, &options, &mut rng());
        assert_eq!(layers[0].noise.brightness, 50);
        assert_eq!(layers[0].noise.hue, 25);
    }

    #[test]
    fn segment_into_document_appends_behind_existing_layers() {
        let mut doc = Document::default();
        let existing = doc.add_layer("base".into(), Rgba::opaque(1, 1, 1), LayerType::Direct);

        let mut grid = PixelGrid::new();
        fill_region(&mut grid, "head-front", Rgba::opaque(9, 9, 9));
        let ids =
            segment_into_document(&mut doc, &grid, &SegmentOptions::default(), &mut rng());
        assert_eq!(ids.len(), 1);
        let new = doc.layer(ids[0]).unwrap();
        let old = doc.layer(existing).unwrap();
        assert!(new.order > old.order);
    }

    #[test]
    fn split_by_color_separates_blobs() {
        let mut doc = Document::default();
        let id = doc.add_layer("head".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        {
            let layer = doc.layer_mut(id).unwrap();
            // Two color blobs inside head-front, not color-similar.
            layer.pixels.fill_rect(8, 8, 2, 2, Some(Rgba::opaque(10, 10, 10)));
            layer.pixels.fill_rect(13, 13, 2, 2, Some(Rgba::opaque(240, 240, 240)));
        }
        let ids = split_layer_by_color(&mut doc, id, 20.0, &mut rng());
        assert_eq!(ids.len(), 2);
        assert!(doc.layer(id).is_none());
        let total: usize = ids.iter().map(|&i| doc.layer(i).unwrap().pixels.count_set()).sum();
        assert_eq!(total, 8);
    }

    #[test]
    fn split_by_color_is_noop_for_homogeneous_layers() {
        let mut doc = Document::default();
        let id = doc.add_layer("head".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        doc.layer_mut(id).unwrap().pixels.fill_rect(8, 8, 4, 4, Some(Rgba::opaque(7, 7, 7)));

        let before = doc.layers().to_vec();
        let ids = split_layer_by_color(&mut doc, id, 30.0, &mut rng());
        assert!(ids.is_empty());
        assert_eq!(doc.layers(), &before[..]);
    }

    #[test]
    fn split_by_selection_moves_pixels_to_average_colored_layer() {
        let mut doc = Document::default();
        let id = doc.add_layer("head".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        {
            let layer = doc.layer_mut(id).unwrap();
            layer.pixels.set(8, 8, Some(Rgba::opaque(100, 0, 0)));
            layer.pixels.set(9, 8, Some(Rgba::opaque(200, 0, 0)));
            layer.pixels.set(10, 8, Some(Rgba::opaque(50, 50, 50)));
        }
        // (20, 20) is not opaque in the source and is silently skipped.
        let new_id =
            split_layer_by_selection(&mut doc, id, &[(8, 8), (9, 8), (20, 20)]).unwrap();

        let source = doc.layer(id).unwrap();
        assert_eq!(source.pixels.count_set(), 1);
        let new = doc.layer(new_id).unwrap();
        assert_eq!(new.base_color, Rgba::opaque(150, 0, 0));
        assert_eq!(new.pixels.count_set(), 2);
    }

    #[test]
    fn split_by_selection_with_empty_selection_is_noop() {
        let mut doc = Document::default();
        let id = doc.add_layer("head".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        assert!(split_layer_by_selection(&mut doc, id, &[(0, 0)]).is_none());
        assert_eq!(doc.layers().len(), 1);
    }

    #[test]
    fn union_find_links_transitively() {
        let mut uf = UnionFind::new(10);
        uf.union(0, 1);
        uf.union(1, 2);
        uf.union(5, 6);
        assert_eq!(uf.find(0), uf.find(2));
        assert_ne!(uf.find(0), uf.find(5));
        assert_eq!(uf.find(3), 3);
    }
}
