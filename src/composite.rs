use rayon::prelude::*;

use crate::grid::PixelGrid;

// ============================================================================
// COMPOSITOR — deterministic flattening of a layer stack into one RGBA image
// ============================================================================

/// Everything the compositor needs to know about one layer. Decoupled from
/// the full `Layer` struct so the offload mirror can composite from its own
/// grid copies with the same code path.
pub struct LayerSlice<'a> {
    pub grid: &'a PixelGrid,
    /// Layer priority; smaller = more foreground.
    pub order: f64,
    /// `(group order, group visible)`, or `None` for ungrouped layers.
    pub group: Option<(f64, bool)>,
    pub visible: bool,
    /// 0–100.
    pub opacity: u8,
}

impl LayerSlice<'_> {
    fn effectively_visible(&self) -> bool {
        self.visible && self.group.map_or(true, |(_, v)| v)
    }

    /// Descending sort on this key gives paint order: higher order values
    /// paint first (background), lower values paint last (foreground).
    /// Ungrouped layers take −∞ as their group key, which under the
    /// descending sort paints them last — ungrouped layers always render
    /// above all grouped layers.
    fn sort_key(&self) -> (f64, f64) {
        (self.group.map_or(f64::NEG_INFINITY, |(o, _)| o), self.order)
    }
}

/// Flatten the stack into a `width * height * 4` RGBA buffer, row-major,
/// top-to-bottom. Transparent (all-zero) wherever no visible layer
/// contributes.
pub fn flatten(width: u32, height: u32, layers: &[LayerSlice]) -> Vec<u8> {
    flatten_inner(width, height, layers, None)
}

/// Like [`flatten`], but additionally records, per pixel, the index (into
/// the caller's `layers` slice) of the topmost layer that contributed any
/// alpha. Used to build the denormalized pixel cache in the project format.
pub fn flatten_with_attribution(
    width: u32,
    height: u32,
    layers: &[LayerSlice],
) -> (Vec<u8>, Vec<Option<usize>>) {
    let mut attribution = vec![None; (width * height) as usize];
    let out = flatten_inner(width, height, layers, Some(&mut attribution));
    (out, attribution)
}

fn flatten_inner(
    width: u32,
    height: u32,
    layers: &[LayerSlice],
    mut attribution: Option<&mut Vec<Option<usize>>>,
) -> Vec<u8> {
    let mut out = vec![0u8; (width * height * 4) as usize];

    // Paint order: descending (group order, layer order).
    let mut paint: Vec<(usize, &LayerSlice)> = layers
        .iter()
        .enumerate()
        .filter(|(_, l)| l.effectively_visible())
        .collect();
    paint.sort_by(|a, b| {
        b.1.sort_key()
            .partial_cmp(&a.1.sort_key())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if paint.is_empty() {
        return out;
    }

    match attribution.as_deref_mut() {
        None => {
            out.par_chunks_mut(width as usize * 4).enumerate().for_each(|(y, row)| {
                composite_row(y as u32, width, &paint, row, None);
            });
        }
        Some(attr) => {
            // Attribution rows borrow mutably alongside pixel rows; keep the
            // zip on one parallel iterator so the split stays in lockstep.
            out.par_chunks_mut(width as usize * 4)
                .zip(attr.par_chunks_mut(width as usize))
                .enumerate()
                .for_each(|(y, (row, attr_row))| {
                    composite_row(y as u32, width, &paint, row, Some(attr_row));
                });
        }
    }
    out
}

fn composite_row(
    y: u32,
    width: u32,
    paint: &[(usize, &LayerSlice)],
    row: &mut [u8],
    mut attr_row: Option<&mut [Option<usize>]>,
) {
    for x in 0..width {
        let mut dst_r = 0.0f32;
        let mut dst_g = 0.0f32;
        let mut dst_b = 0.0f32;
        let mut dst_a = 0.0f32;
        let mut top: Option<usize> = None;

        for &(orig_idx, layer) in paint {
            let Some(src) = layer.grid.get(x, y) else { continue };
            // Source-over with the layer opacity scaling the source alpha.
            let src_a = src.a as f32 / 255.0 * layer.opacity.min(100) as f32 / 100.0;
            if src_a <= 0.0 {
                continue;
            }
            let out_a = src_a + dst_a * (1.0 - src_a);
            dst_r = (src.r as f32 * src_a + dst_r * dst_a * (1.0 - src_a)) / out_a;
            dst_g = (src.g as f32 * src_a + dst_g * dst_a * (1.0 - src_a)) / out_a;
            dst_b = (src.b as f32 * src_a + dst_b * dst_a * (1.0 - src_a)) / out_a;
            dst_a = out_a;
            top = Some(orig_idx);
        }

        let base = x as usize * 4;
        if dst_a > 0.0 {
            row[base] = dst_r.round().clamp(0.0, 255.0) as u8;
            row[base + 1] = dst_g.round().clamp(0.0, 255.0) as u8;
            row[base + 2] = dst_b.round().clamp(0.0, 255.0) as u8;
            row[base + 3] = (dst_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        if let Some(attr) = attr_row.as_deref_mut() {
            attr[x as usize] = top;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    fn solid_grid(color: Rgba) -> PixelGrid {
        let mut g = PixelGrid::new();
        g.fill_rect(0, 0, 64, 64, Some(color));
        g
    }

    fn slice<'a>(grid: &'a PixelGrid, order: f64) -> LayerSlice<'a> {
        LayerSlice { grid, order, group: None, visible: true, opacity: 100 }
    }

    #[test]
    fn empty_stack_is_fully_transparent() {
        let out = flatten(64, 64, &[]);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn hidden_layers_do_not_contribute() {
        let g = solid_grid(Rgba::opaque(200, 10, 10));
        let mut s = slice(&g, 0.0);
        s.visible = false;
        let out = flatten(64, 64, &[s]);
        assert!(out.iter().all(|&b| b == 0));

        // Visible layer inside a hidden group is also dropped.
        let mut s = slice(&g, 0.0);
        s.group = Some((0.0, false));
        let out = flatten(64, 64, &[s]);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn opacity_scales_output_alpha_linearly() {
        let g = solid_grid(Rgba::opaque(100, 100, 100));
        for (opacity, expect_a) in [(100u8, 255u8), (50, 128), (25, 64), (0, 0)] {
            let mut s = slice(&g, 0.0);
            s.opacity = opacity;
            let out = flatten(64, 64, &[s]);
            assert_eq!(out[3], expect_a, "opacity {opacity}");
        }
    }

    #[test]
    fn lower_order_paints_on_top() {
        let back = solid_grid(Rgba::opaque(1, 1, 1));
        let front = solid_grid(Rgba::opaque(250, 0, 0));
        let out = flatten(64, 64, &[slice(&back, 1.0), slice(&front, 0.0)]);
        assert_eq!(&out[0..4], &[250, 0, 0, 255]);
        // Same result regardless of input ordering.
        let out = flatten(64, 64, &[slice(&front, 0.0), slice(&back, 1.0)]);
        assert_eq!(&out[0..4], &[250, 0, 0, 255]);
    }

    #[test]
    fn ungrouped_layers_render_above_grouped() {
        let grouped = solid_grid(Rgba::opaque(10, 200, 10));
        let ungrouped = solid_grid(Rgba::opaque(200, 10, 10));
        let mut gs = slice(&grouped, 0.0);
        // Group order far in the foreground range; ungrouped must still win.
        gs.group = Some((-100.0, true));
        let out = flatten(64, 64, &[gs, slice(&ungrouped, 99.0)]);
        assert_eq!(&out[0..4], &[200, 10, 10, 255]);
    }

    #[test]
    fn source_over_blends_semi_transparent() {
        let back = solid_grid(Rgba::opaque(0, 0, 0));
        let mut front_grid = PixelGrid::new();
        front_grid.fill_rect(0, 0, 64, 64, Some(Rgba::new(255, 255, 255, 128)));
        let out = flatten(64, 64, &[slice(&back, 1.0), slice(&front_grid, 0.0)]);
        // ~50% white over black.
        assert!(out[0] >= 127 && out[0] <= 129);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn attribution_reports_topmost_contributor() {
        let back = solid_grid(Rgba::opaque(1, 1, 1));
        let mut front_grid = PixelGrid::new();
        front_grid.set(5, 5, Some(Rgba::opaque(9, 9, 9)));
        let layers = [slice(&back, 1.0), slice(&front_grid, 0.0)];
        let (_, attr) = flatten_with_attribution(64, 64, &layers);
        assert_eq!(attr[(5 * 64 + 5) as usize], Some(1));
        assert_eq!(attr[0], Some(0));
    }
}
