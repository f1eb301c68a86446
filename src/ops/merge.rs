use std::collections::HashSet;

use uuid::Uuid;

use crate::color::{Rgba, are_similar};
use crate::document::Document;
use crate::log_info;
use crate::topology::SkinTopology;

// ============================================================================
// MERGES — collapse layers into each other
// ============================================================================

/// Greedy first-fit merge: scan layers in stack order and fold each one into
/// the first previously-kept layer whose base color is within `threshold`.
/// Deliberately order-dependent rather than a global clustering; the result
/// matches what a user scanning the layer list top-down would expect.
/// Returns the number of layers merged away.
pub fn merge_similar(doc: &mut Document, threshold: f32) -> usize {
    // Plan first: (source, target) pairs against the kept set.
    let mut kept: Vec<(Uuid, Rgba)> = Vec::new();
    let mut plan: Vec<(Uuid, Uuid)> = Vec::new();
    for layer in doc.layers() {
        match kept.iter().find(|(_, base)| are_similar(layer.base_color, *base, threshold)) {
            Some(&(target, _)) => plan.push((layer.id, target)),
            None => kept.push((layer.id, layer.base_color)),
        }
    }
    if plan.is_empty() {
        return 0;
    }

    doc.take_snapshot();
    for (source, target) in &plan {
        merge_pixels(doc, *source, *target);
    }
    log_info!("merge-similar: folded {} layer(s) at threshold {:.0}", plan.len(), threshold);
    plan.len()
}

/// Fold `source` into `target`: every opaque source pixel is written into
/// the target grid (source wins where both are opaque), then the source
/// layer is deleted. Unknown ids are a no-op.
pub fn merge_layers(doc: &mut Document, source: Uuid, target: Uuid) -> bool {
    if source == target || doc.layer(source).is_none() || doc.layer(target).is_none() {
        return false;
    }
    doc.take_snapshot();
    merge_pixels(doc, source, target);
    true
}

fn merge_pixels(doc: &mut Document, source: Uuid, target: Uuid) {
    let Some(src) = doc.layer(source) else { return };
    let moved: Vec<(u32, u32, Rgba)> = src.pixels.iter_set().collect();
    if let Some(dst) = doc.layer_mut(target) {
        for (x, y, c) in moved {
            dst.pixels.set(x, y, Some(c));
        }
    }
    doc.remove_layer(source);
    doc.push_layer_to_mirror(target);
    doc.mark_dirty();
}

// ============================================================================
// BORDER BLENDING — soften seams between adjacent layers
// ============================================================================

/// For every opaque pixel 4-adjacent to a different layer's opaque pixel
/// within the same body-part + UV-layer key, pull its color toward the
/// average of those foreign neighbors by `strength` percent. All updates
/// are computed against the pre-blend state, then applied at once, so the
/// result does not depend on layer iteration order. `scope` restricts the
/// blend to one layer's pixels (its neighbors still come from everywhere).
pub fn blend_borders(doc: &mut Document, strength: u8, scope: Option<Uuid>) {
    let strength = strength.min(100) as f32 / 100.0;
    if strength <= 0.0 {
        return;
    }
    let topo = SkinTopology::for_variant(doc.variant);

    let mut updates: Vec<(Uuid, u32, u32, Rgba)> = Vec::new();
    for layer in doc.layers() {
        if let Some(scope_id) = scope
            && layer.id != scope_id
        {
            continue;
        }
        for (x, y, color) in layer.pixels.iter_set() {
            let Some(key) = topo.region_at(x, y).map(|r| r.key()) else { continue };

            let mut sum = (0u32, 0u32, 0u32);
            let mut n = 0u32;
            let neighbors =
                [(x.wrapping_sub(1), y), (x + 1, y), (x, y.wrapping_sub(1)), (x, y + 1)];
            for (nx, ny) in neighbors {
                if topo.region_at(nx, ny).map(|r| r.key()) != Some(key) {
                    continue;
                }
                for other in doc.layers() {
                    if other.id == layer.id {
                        continue;
                    }
                    if let Some(c) = other.pixels.get(nx, ny) {
                        sum = (sum.0 + c.r as u32, sum.1 + c.g as u32, sum.2 + c.b as u32);
                        n += 1;
                    }
                }
            }
            if n == 0 {
                continue;
            }

            let avg = (sum.0 as f32 / n as f32, sum.1 as f32 / n as f32, sum.2 as f32 / n as f32);
            let lerp = |from: u8, to: f32| {
                (from as f32 + (to - from as f32) * strength).round().clamp(0.0, 255.0) as u8
            };
            let blended = Rgba {
                r: lerp(color.r, avg.0),
                g: lerp(color.g, avg.1),
                b: lerp(color.b, avg.2),
                a: color.a,
            };
            if blended != color {
                updates.push((layer.id, x, y, blended));
            }
        }
    }
    if updates.is_empty() {
        return;
    }

    doc.take_snapshot();
    let mut touched: HashSet<Uuid> = HashSet::new();
    for (layer_id, x, y, color) in updates {
        if let Some(layer) = doc.layer_mut(layer_id) {
            layer.pixels.set(x, y, Some(color));
            touched.insert(layer_id);
        }
    }
    for layer_id in touched {
        doc.push_layer_to_mirror(layer_id);
    }
    doc.mark_dirty();
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LayerType;

    #[test]
    fn merge_source_pixels_win_over_target() {
        let mut doc = Document::default();
        let target = doc.add_layer("a".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        let source = doc.add_layer("b".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        doc.layer_mut(target).unwrap().pixels.set(8, 8, Some(Rgba::opaque(1, 1, 1)));
        doc.layer_mut(target).unwrap().pixels.set(9, 8, Some(Rgba::opaque(2, 2, 2)));
        doc.layer_mut(source).unwrap().pixels.set(8, 8, Some(Rgba::opaque(250, 0, 0)));

        assert!(merge_layers(&mut doc, source, target));
        assert!(doc.layer(source).is_none());
        let merged = doc.layer(target).unwrap();
        // Contested coordinate takes the source value; the rest is untouched.
        assert_eq!(merged.pixels.get(8, 8), Some(Rgba::opaque(250, 0, 0)));
        assert_eq!(merged.pixels.get(9, 8), Some(Rgba::opaque(2, 2, 2)));
    }

    #[test]
    fn merge_with_unknown_or_self_id_is_noop() {
        let mut doc = Document::default();
        let id = doc.add_layer("a".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        assert!(!merge_layers(&mut doc, id, id));
        assert!(!merge_layers(&mut doc, Uuid::new_v4(), id));
        assert_eq!(doc.layers().len(), 1);
    }

    #[test]
    fn merge_similar_is_first_fit_in_stack_order() {
        let mut doc = Document::default();
        let a = doc.add_layer("a".into(), Rgba::opaque(100, 100, 100), LayerType::Direct);
        let b = doc.add_layer("b".into(), Rgba::opaque(105, 100, 100), LayerType::Direct);
        let c = doc.add_layer("c".into(), Rgba::opaque(250, 0, 0), LayerType::Direct);
        doc.layer_mut(b).unwrap().pixels.set(8, 8, Some(Rgba::opaque(105, 100, 100)));

        let merged = merge_similar(&mut doc, 20.0);
        assert_eq!(merged, 1);
        // b folded into a (the first kept similar layer); c stays.
        assert!(doc.layer(b).is_none());
        assert!(doc.layer(a).unwrap().pixels.is_opaque(8, 8));
        assert!(doc.layer(c).is_some());
    }

    #[test]
    fn merge_similar_chain_folds_into_earliest_match() {
        // c is similar to b but b merges into a first; c then compares
        // against the kept set (a only) and stays if dissimilar to a.
        let mut doc = Document::default();
        let a = doc.add_layer("a".into(), Rgba::opaque(100, 0, 0), LayerType::Direct);
        let _b = doc.add_layer("b".into(), Rgba::opaque(115, 0, 0), LayerType::Direct);
        let c = doc.add_layer("c".into(), Rgba::opaque(130, 0, 0), LayerType::Direct);

        merge_similar(&mut doc, 20.0);
        assert!(doc.layer(a).is_some());
        // 130 vs 100 distance is 30 > 20: c survives even though it was
        // within 20 of the merged-away b.
        assert!(doc.layer(c).is_some());
        assert_eq!(doc.layers().len(), 2);
    }

    #[test]
    fn blend_pulls_border_pixels_toward_neighbors() {
        let mut doc = Document::default();
        let a = doc.add_layer("a".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        let b = doc.add_layer("b".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        // Side by side inside head-front.
        doc.layer_mut(a).unwrap().pixels.set(10, 10, Some(Rgba::opaque(0, 0, 0)));
        doc.layer_mut(b).unwrap().pixels.set(11, 10, Some(Rgba::opaque(200, 200, 200)));

        blend_borders(&mut doc, 50, None);
        assert_eq!(doc.layer(a).unwrap().pixels.get(10, 10), Some(Rgba::opaque(100, 100, 100)));
        assert_eq!(doc.layer(b).unwrap().pixels.get(11, 10), Some(Rgba::opaque(100, 100, 100)));
    }

    #[test]
    fn blend_respects_part_key_boundaries() {
        let mut doc = Document::default();
        let a = doc.add_layer("a".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        let b = doc.add_layer("b".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        // (31, 10) is head-back, (32, 10) is hat-right: different part keys.
        doc.layer_mut(a).unwrap().pixels.set(31, 10, Some(Rgba::opaque(0, 0, 0)));
        doc.layer_mut(b).unwrap().pixels.set(32, 10, Some(Rgba::opaque(200, 200, 200)));

        blend_borders(&mut doc, 50, None);
        assert_eq!(doc.layer(a).unwrap().pixels.get(31, 10), Some(Rgba::opaque(0, 0, 0)));
        assert_eq!(doc.layer(b).unwrap().pixels.get(32, 10), Some(Rgba::opaque(200, 200, 200)));
    }

    #[test]
    fn blend_scope_limits_writes_to_one_layer() {
        let mut doc = Document::default();
        let a = doc.add_layer("a".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        let b = doc.add_layer("b".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        doc.layer_mut(a).unwrap().pixels.set(10, 10, Some(Rgba::opaque(0, 0, 0)));
        doc.layer_mut(b).unwrap().pixels.set(11, 10, Some(Rgba::opaque(200, 200, 200)));

        blend_borders(&mut doc, 50, Some(a));
        assert_eq!(doc.layer(a).unwrap().pixels.get(10, 10), Some(Rgba::opaque(100, 100, 100)));
        // Out-of-scope layer is read from but never written.
        assert_eq!(doc.layer(b).unwrap().pixels.get(11, 10), Some(Rgba::opaque(200, 200, 200)));
    }
}
