use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ImageError, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::{Material, Rgba};
use crate::composite;
use crate::document::{Document, Layer, LayerGroup, LayerType, NoiseSettings, PaletteEntry};
use crate::grid::{PixelGrid, SKIN_SIZE};
use crate::log_info;
use crate::topology::ModelVariant;

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Error type for skin/project file operations.
#[derive(Debug)]
pub enum SkinError {
    Io(std::io::Error),
    Image(String),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for SkinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkinError::Io(e) => write!(f, "I/O error: {}", e),
            SkinError::Image(e) => write!(f, "Image error: {}", e),
            SkinError::Serialize(e) => write!(f, "Serialization error: {}", e),
            SkinError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for SkinError {}

impl From<std::io::Error> for SkinError {
    fn from(e: std::io::Error) -> Self {
        SkinError::Io(e)
    }
}

impl From<ImageError> for SkinError {
    fn from(e: ImageError) -> Self {
        SkinError::Image(e.to_string())
    }
}

impl From<serde_json::Error> for SkinError {
    fn from(e: serde_json::Error) -> Self {
        SkinError::Serialize(e.to_string())
    }
}

// ============================================================================
// PNG IMPORT / EXPORT
// ============================================================================

/// Load a skin PNG into a pixel grid. Images that are not 64×64 (e.g. HD
/// skins scaled by a resource pack) are resampled to the canonical size with
/// nearest-neighbor, which preserves hard pixel edges.
pub fn load_skin_png(path: &Path) -> Result<PixelGrid, SkinError> {
    let img = image::open(path)?.to_rgba8();
    let img = if img.width() != SKIN_SIZE || img.height() != SKIN_SIZE {
        imageops::resize(&img, SKIN_SIZE, SKIN_SIZE, imageops::FilterType::Nearest)
    } else {
        img
    };
    Ok(grid_from_rgba(&img))
}

fn grid_from_rgba(img: &RgbaImage) -> PixelGrid {
    let mut grid = PixelGrid::with_size(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        if p[3] > 0 {
            grid.set(x, y, Some(Rgba::new(p[0], p[1], p[2], p[3])));
        }
    }
    grid
}

/// Write a flat RGBA buffer as a PNG file.
pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<(), SkinError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = PngEncoder::new(&mut writer);
    #[allow(deprecated)]
    encoder
        .encode(rgba, width, height, image::ColorType::Rgba8)
        .map_err(|e| SkinError::Image(e.to_string()))?;
    Ok(())
}

// ============================================================================
// SKP PROJECT FILE FORMAT — versioned JSON
// ============================================================================
//
// v2 layout (current):
//   { "v": 2, "m": <variant>, "l": [layer...], "g": [group...],
//     "p": [pixel-cache...], "c": [palette...] }
//
// Each layer is a tuple:
//   [id, name, [r,g,b,a], [brightness,hue,material], group-id|null,
//    order, type, visible, opacity, [[x, y, [r,g,b,a]], ...]]
//
// Per-layer sparse pixel lists are authoritative. "p" is a denormalized
// composite cache: a dense width*height array, row-major, of either null
// or [topmost-layer-index, r, g, b, a], written for cheap thumbnailing.
// It is regenerable and ignored on load.
//
// v1 (legacy) lacks per-layer pixel lists; there "p" was the only pixel
// store and layer grids are reconstructed from it on load.

const FORMAT_VERSION: u32 = 2;

type LayerRecord = (
    String,                   // id
    String,                   // name
    [u8; 4],                  // base color
    (u8, u8, u8),             // noise: brightness, hue, material
    Option<String>,           // group id
    f64,                      // order
    u8,                       // layer type
    bool,                     // visible
    u8,                       // opacity
    Vec<(u32, u32, [u8; 4])>, // sparse pixels
);

type GroupRecord = (String, String, f64, bool);
type PixelCacheRecord = Option<(usize, u8, u8, u8, u8)>;
type PaletteRecord = (String, [u8; 4], Option<String>);

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    v: u32,
    m: u8,
    l: Vec<LayerRecord>,
    g: Vec<GroupRecord>,
    #[serde(default)]
    p: Vec<PixelCacheRecord>,
    #[serde(default)]
    c: Vec<PaletteRecord>,
}

/// Serialize the document to the current project JSON.
pub fn project_to_json(doc: &Document) -> Result<String, SkinError> {
    Ok(serde_json::to_string(&build_project_file(doc))?)
}

/// Save the document as a `.skp` project file.
pub fn save_project(doc: &Document, path: &Path) -> Result<(), SkinError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, &build_project_file(doc))?;
    log_info!("saved project to {}", path.display());
    Ok(())
}

fn build_project_file(doc: &Document) -> ProjectFile {
    let l = doc
        .layers()
        .iter()
        .map(|layer| {
            (
                layer.id.to_string(),
                layer.name.clone(),
                layer.base_color.to_array(),
                (layer.noise.brightness, layer.noise.hue, layer.noise.material.to_u8()),
                layer.group_id.map(|g| g.to_string()),
                layer.order,
                layer.layer_type.to_u8(),
                layer.visible,
                layer.opacity,
                layer.pixels.iter_set().map(|(x, y, c)| (x, y, c.to_array())).collect(),
            )
        })
        .collect();
    let g = doc
        .groups()
        .iter()
        .map(|group| (group.id.to_string(), group.name.clone(), group.order, group.visible))
        .collect();
    let c = doc
        .palette
        .iter()
        .map(|entry| (entry.id.to_string(), entry.color.to_array(), entry.name.clone()))
        .collect();

    // Denormalized composite cache with topmost-layer attribution, one
    // entry per canvas pixel in row-major order.
    let (flat, attribution) =
        composite::flatten_with_attribution(doc.width(), doc.height(), &doc.layer_slices());
    let mut p = Vec::with_capacity(attribution.len());
    for (i, owner) in attribution.iter().enumerate() {
        p.push(owner.map(|owner| {
            let b = &flat[i * 4..i * 4 + 4];
            (owner, b[0], b[1], b[2], b[3])
        }));
    }

    ProjectFile { v: FORMAT_VERSION, m: doc.variant.to_u8(), l, g, p, c }
}

/// Load a `.skp` project file. Parsing is all-or-nothing: a malformed file
/// returns an error and no partially-built document.
pub fn load_project(path: &Path) -> Result<Document, SkinError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let project: ProjectFile = serde_json::from_reader(reader)?;
    let doc = document_from_project(project)?;
    log_info!("loaded project from {}", path.display());
    Ok(doc)
}

/// Parse project JSON from a string (used by tests and in-memory transfer).
pub fn project_from_json(json: &str) -> Result<Document, SkinError> {
    document_from_project(serde_json::from_str(json)?)
}

fn document_from_project(project: ProjectFile) -> Result<Document, SkinError> {
    match project.v {
        1 | 2 => {}
        v => {
            return Err(SkinError::InvalidFormat(format!(
                "Unknown project version {v} (supported: 1, 2)"
            )));
        }
    }

    let parse_id = |s: &str| {
        Uuid::parse_str(s).map_err(|_| SkinError::InvalidFormat(format!("Invalid id '{s}'")))
    };

    let mut doc = Document::new(ModelVariant::from_u8(project.m));
    let mut layers = Vec::with_capacity(project.l.len());
    for (id, name, base, noise, group, order, ty, visible, opacity, pixels) in &project.l {
        let mut layer =
            Layer::new(name.clone(), Rgba::from_array(*base), LayerType::from_u8(*ty), *order);
        layer.id = parse_id(id)?;
        layer.noise = NoiseSettings {
            brightness: noise.0,
            hue: noise.1,
            material: Material::from_u8(noise.2),
        };
        layer.group_id = group.as_deref().map(parse_id).transpose()?;
        layer.visible = *visible;
        layer.opacity = (*opacity).min(100);
        for &(x, y, c) in pixels {
            layer.pixels.set(x, y, Some(Rgba::from_array(c)));
        }
        layers.push(layer);
    }

    // v1 files carry pixels only in the composite cache; rebuild the layer
    // grids from it. v2 per-layer lists are authoritative and "p" is
    // ignored.
    if project.v == 1 {
        for (i, entry) in project.p.iter().enumerate() {
            let Some((owner, r, g, b, a)) = entry else { continue };
            let (x, y) = (i as u32 % SKIN_SIZE, i as u32 / SKIN_SIZE);
            if let Some(layer) = layers.get_mut(*owner) {
                layer.pixels.set(x, y, Some(Rgba::new(*r, *g, *b, *a)));
            }
        }
    }

    for layer in layers {
        doc.adopt_layer(layer);
    }
    for (id, name, order, visible) in &project.g {
        let mut group = LayerGroup::new(name.clone(), *order);
        group.id = parse_id(id)?;
        group.visible = *visible;
        doc.insert_group_raw(group);
    }
    for (id, color, name) in &project.c {
        let entry =
            PaletteEntry { id: parse_id(id)?, color: Rgba::from_array(*color), name: name.clone() };
        doc.palette.push(entry);
    }
    Ok(doc)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        let mut doc = Document::new(ModelVariant::Slim);
        let a = doc.add_layer("head-1".into(), Rgba::opaque(200, 100, 50), LayerType::SingleColor);
        let b = doc.add_layer("body-2".into(), Rgba::opaque(10, 20, 30), LayerType::Direct);
        doc.layer_mut(a).unwrap().pixels.fill_rect(8, 8, 4, 4, Some(Rgba::opaque(200, 100, 50)));
        doc.layer_mut(b).unwrap().pixels.set(20, 20, Some(Rgba::new(1, 2, 3, 128)));
        let gid = doc.add_group("torso".into());
        doc.move_layer_to_group(b, Some(gid));
        doc.set_layer_opacity(b, 70);
        doc.add_palette_entry(Rgba::opaque(255, 0, 0), Some("accent".into()));
        doc
    }

    #[test]
    fn project_round_trips_through_json() {
        let doc = sample_document();
        let json = project_to_json(&doc).unwrap();
        let restored = project_from_json(&json).unwrap();

        assert_eq!(restored.variant, ModelVariant::Slim);
        assert_eq!(restored.layers().len(), 2);
        assert_eq!(restored.groups().len(), 1);
        assert_eq!(restored.palette.len(), 1);

        for (orig, back) in doc.layers().iter().zip(restored.layers()) {
            assert_eq!(orig.id, back.id);
            assert!(orig.metadata_eq(back), "layer {} metadata drifted", orig.name);
            assert_eq!(orig.pixels, back.pixels, "layer {} pixels drifted", orig.name);
        }
        assert_eq!(doc.groups(), restored.groups());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let json = r#"{"v":9,"m":0,"l":[],"g":[]}"#;
        match project_from_json(json) {
            Err(SkinError::InvalidFormat(msg)) => assert!(msg.contains('9')),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn structurally_invalid_json_is_rejected() {
        assert!(matches!(project_from_json("{"), Err(SkinError::Serialize(_))));
        assert!(matches!(project_from_json(r#"{"v":2}"#), Err(SkinError::Serialize(_))));
    }

    fn dense_cache(entries: &[(u32, u32, usize, [u8; 4])]) -> String {
        let mut cache: Vec<PixelCacheRecord> = vec![None; (SKIN_SIZE * SKIN_SIZE) as usize];
        for &(x, y, owner, c) in entries {
            cache[(y * SKIN_SIZE + x) as usize] = Some((owner, c[0], c[1], c[2], c[3]));
        }
        serde_json::to_string(&cache).unwrap()
    }

    #[test]
    fn pixel_cache_is_a_dense_null_padded_array() {
        let doc = sample_document();
        let json = project_to_json(&doc).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let p = value["p"].as_array().unwrap();
        assert_eq!(p.len(), (SKIN_SIZE * SKIN_SIZE) as usize);
        // (0, 0) has no contributor; (8, 8) is owned by the first layer.
        assert!(p[0].is_null());
        let entry = p[(8 * SKIN_SIZE + 8) as usize].as_array().unwrap();
        assert_eq!(entry.len(), 5);
        assert_eq!(entry[0], 0);
    }

    #[test]
    fn v1_files_rebuild_layer_grids_from_the_pixel_cache() {
        let id = Uuid::new_v4();
        let cache =
            dense_cache(&[(8, 8, 0, [200, 100, 50, 255]), (9, 8, 0, [201, 100, 50, 255])]);
        let json = format!(
            r#"{{"v":1,"m":0,
                "l":[["{id}","head-1",[200,100,50,255],[0,0,0],null,0.0,0,true,100,[]]],
                "g":[],
                "p":{cache}}}"#
        );
        let doc = project_from_json(&json).unwrap();
        let layer = doc.layer(id).unwrap();
        assert_eq!(layer.pixels.count_set(), 2);
        assert_eq!(layer.pixels.get(9, 8), Some(Rgba::opaque(201, 100, 50)));
    }

    #[test]
    fn v2_ignores_the_pixel_cache() {
        let id = Uuid::new_v4();
        // The cache claims a pixel the layer list does not have; v2 trusts
        // the layer list.
        let cache = dense_cache(&[(30, 30, 0, [9, 9, 9, 255])]);
        let json = format!(
            r#"{{"v":2,"m":0,
                "l":[["{id}","head-1",[200,100,50,255],[0,0,0],null,0.0,0,true,100,[[8,8,[200,100,50,255]]]]],
                "g":[],
                "p":{cache}}}"#
        );
        let doc = project_from_json(&json).unwrap();
        let layer = doc.layer(id).unwrap();
        assert_eq!(layer.pixels.count_set(), 1);
        assert_eq!(layer.pixels.get(30, 30), None);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let json = r#"{"v":2,"m":0,"l":[["not-a-uuid","x",[0,0,0,255],[0,0,0],null,0.0,0,true,100,[]]],"g":[]}"#;
        assert!(matches!(project_from_json(json), Err(SkinError::InvalidFormat(_))));
    }

    #[test]
    fn png_round_trip_through_a_temp_file() {
        let mut doc = sample_document();
        let flat = doc.composite();
        let dir = std::env::temp_dir().join("skinpaint-io-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.png", Uuid::new_v4()));

        write_png(&path, doc.width(), doc.height(), &flat).unwrap();
        let grid = load_skin_png(&path).unwrap();
        assert_eq!(grid.width(), SKIN_SIZE);
        // The opaque block written by the sample survives the round trip.
        assert!(grid.is_opaque(8, 8));
        std::fs::remove_file(&path).ok();
    }
}
