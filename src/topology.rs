use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

// ============================================================================
// SKIN TOPOLOGY — how the 64×64 atlas wraps around the 3D box model
// ============================================================================
//
// The skin texture is an unwrap of six boxes (head, body, two arms, two
// legs), each present twice: a base shell (UV layer 1) and an overlay shell
// (UV layer 2: hat, jacket, sleeves, pants). Every box unwraps to the same
// cross pattern:
//
//         +----+----+
//         | top|bot |
//    +----+----+----+----+
//    | rgt|frnt| lft| bck|
//    +----+----+----+----+
//
// Faces that touch in 3D but not in the atlas (the wrap-around seam, the
// top/bottom rims) are declared in the edge-connection table so that the
// segmentation engine can union pixels across them.

/// Arm width differs between the two model variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelVariant {
    /// 4-pixel-wide arms.
    #[default]
    Wide,
    /// 3-pixel-wide arms.
    Slim,
}

impl ModelVariant {
    pub fn to_u8(&self) -> u8 {
        match self {
            ModelVariant::Wide => 0,
            ModelVariant::Slim => 1,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ModelVariant::Slim,
            _ => ModelVariant::Wide,
        }
    }
}

/// Body part a region belongs to. Together with the UV layer this forms the
/// segmentation boundary: components never span two different part keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Head,
    Body,
    RightArm,
    LeftArm,
    RightLeg,
    LeftLeg,
}

impl BodyPart {
    pub fn name(&self) -> &'static str {
        match self {
            BodyPart::Head => "head",
            BodyPart::Body => "body",
            BodyPart::RightArm => "right-arm",
            BodyPart::LeftArm => "left-arm",
            BodyPart::RightLeg => "right-leg",
            BodyPart::LeftLeg => "left-leg",
        }
    }
}

/// Body part plus UV layer. "head, layer 1" and "head, layer 2" are distinct
/// keys even though both map onto the same 3D head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartKey {
    pub part: BodyPart,
    pub uv_layer: u8,
}

impl PartKey {
    /// Display name used for generated layer names:
    /// `head`, `head-overlay`, `right-arm`, ...
    pub fn display_name(&self) -> String {
        if self.uv_layer == 2 {
            format!("{}-overlay", self.part.name())
        } else {
            self.part.name().to_string()
        }
    }
}

/// One rectangular face of the unwrapped model.
#[derive(Clone, Debug)]
pub struct SkinRegion {
    /// Atlas face label, e.g. `head-front` or `jacket-back`.
    pub name: String,
    pub part: BodyPart,
    /// 1 = base shell, 2 = overlay shell.
    pub uv_layer: u8,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SkinRegion {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn key(&self) -> PartKey {
        PartKey { part: self.part, uv_layer: self.uv_layer }
    }
}

/// Which side of a region an edge run lies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Declares that the pixel run along `edge_a` of face `face_a` is physically
/// adjacent in 3D to the run along `edge_b` of `face_b`. `reversed` means the
/// two runs wind in opposite directions and must be paired back-to-front.
#[derive(Clone, Debug)]
pub struct UvEdgeConnection {
    pub face_a: &'static str,
    pub edge_a: Edge,
    pub face_b: &'static str,
    pub edge_b: Edge,
    pub reversed: bool,
}

/// The full region + edge-connection table for one model variant.
pub struct SkinTopology {
    pub regions: Vec<SkinRegion>,
    pub connections: Vec<UvEdgeConnection>,
}

static WIDE: LazyLock<SkinTopology> = LazyLock::new(|| SkinTopology::build(ModelVariant::Wide));
static SLIM: LazyLock<SkinTopology> = LazyLock::new(|| SkinTopology::build(ModelVariant::Slim));

impl SkinTopology {
    pub fn for_variant(variant: ModelVariant) -> &'static SkinTopology {
        match variant {
            ModelVariant::Wide => &WIDE,
            ModelVariant::Slim => &SLIM,
        }
    }

    /// Region containing (x, y), if any. Regions are non-overlapping, so the
    /// first rectangle match is the only one.
    pub fn region_at(&self, x: u32, y: u32) -> Option<&SkinRegion> {
        self.regions.iter().find(|r| r.contains(x, y))
    }

    pub fn region_by_name(&self, name: &str) -> Option<&SkinRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// The pixel coordinates along one edge of a region.
    /// Top/bottom edges run left→right; left/right edges run top→bottom.
    pub fn edge_run(region: &SkinRegion, edge: Edge) -> Vec<(u32, u32)> {
        match edge {
            Edge::Top => (region.x..region.x + region.width).map(|x| (x, region.y)).collect(),
            Edge::Bottom => (region.x..region.x + region.width)
                .map(|x| (x, region.y + region.height - 1))
                .collect(),
            Edge::Left => (region.y..region.y + region.height).map(|y| (region.x, y)).collect(),
            Edge::Right => (region.y..region.y + region.height)
                .map(|y| (region.x + region.width - 1, y))
                .collect(),
        }
    }

    fn build(variant: ModelVariant) -> Self {
        let arm_w = match variant {
            ModelVariant::Wide => 4,
            ModelVariant::Slim => 3,
        };

        let boxes: &[(&'static str, BodyPart, u8, u32, u32, u32, u32, u32)] = &[
            // (prefix, part, uv_layer, origin_x, origin_y, w, h, d)
            ("head", BodyPart::Head, 1, 0, 0, 8, 8, 8),
            ("hat", BodyPart::Head, 2, 32, 0, 8, 8, 8),
            ("body", BodyPart::Body, 1, 16, 16, 8, 12, 4),
            ("jacket", BodyPart::Body, 2, 16, 32, 8, 12, 4),
            ("right-arm", BodyPart::RightArm, 1, 40, 16, arm_w, 12, 4),
            ("right-sleeve", BodyPart::RightArm, 2, 40, 32, arm_w, 12, 4),
            ("left-arm", BodyPart::LeftArm, 1, 32, 48, arm_w, 12, 4),
            ("left-sleeve", BodyPart::LeftArm, 2, 48, 48, arm_w, 12, 4),
            ("right-leg", BodyPart::RightLeg, 1, 0, 16, 4, 12, 4),
            ("right-pant", BodyPart::RightLeg, 2, 0, 32, 4, 12, 4),
            ("left-leg", BodyPart::LeftLeg, 1, 16, 48, 4, 12, 4),
            ("left-pant", BodyPart::LeftLeg, 2, 0, 48, 4, 12, 4),
        ];

        let mut regions = Vec::new();
        let mut connections = Vec::new();
        for &(prefix, part, uv, ox, oy, w, h, d) in boxes {
            box_faces(&mut regions, prefix, part, uv, ox, oy, w, h, d);
            box_connections(&mut connections, prefix);
        }
        SkinTopology { regions, connections }
    }
}

/// Emit the six face rectangles of one box unwrap.
/// The box is `w` wide, `h` tall and `d` deep, unwrapped at `(ox, oy)`.
fn box_faces(
    out: &mut Vec<SkinRegion>,
    prefix: &str,
    part: BodyPart,
    uv_layer: u8,
    ox: u32,
    oy: u32,
    w: u32,
    h: u32,
    d: u32,
) {
    let faces = [
        ("top", ox + d, oy, w, d),
        ("bottom", ox + d + w, oy, w, d),
        ("right", ox, oy + d, d, h),
        ("front", ox + d, oy + d, w, h),
        ("left", ox + d + w, oy + d, d, h),
        ("back", ox + d + w + d, oy + d, w, h),
    ];
    for (face, x, y, width, height) in faces {
        out.push(SkinRegion {
            name: format!("{prefix}-{face}"),
            part,
            uv_layer,
            x,
            y,
            width,
            height,
        });
    }
}

/// The non-atlas-adjacent 3D adjacencies of one box unwrap. Edges that
/// already touch in 2D (front↔left, right↔front, top↔front) are covered by
/// the plain neighbor pass and are not declared here.
fn box_connections(out: &mut Vec<UvEdgeConnection>, prefix: &str) {
    // Leaked once per variant at table construction; connections are 'static.
    let face = |f: &str| -> &'static str { Box::leak(format!("{prefix}-{f}").into_boxed_str()) };

    let pairs = [
        // Wrap-around seam: the back face meets the right face.
        (face("back"), Edge::Right, face("right"), Edge::Left, false),
        // Top rim.
        (face("top"), Edge::Left, face("right"), Edge::Top, false),
        (face("top"), Edge::Right, face("left"), Edge::Top, true),
        (face("top"), Edge::Top, face("back"), Edge::Top, true),
        // Bottom rim.
        (face("bottom"), Edge::Top, face("front"), Edge::Bottom, false),
        (face("bottom"), Edge::Left, face("right"), Edge::Bottom, true),
        (face("bottom"), Edge::Right, face("left"), Edge::Bottom, false),
        (face("bottom"), Edge::Bottom, face("back"), Edge::Bottom, true),
    ];
    for (face_a, edge_a, face_b, edge_b, reversed) in pairs {
        out.push(UvEdgeConnection { face_a, edge_a, face_b, edge_b, reversed });
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_do_not_overlap() {
        for variant in [ModelVariant::Wide, ModelVariant::Slim] {
            let topo = SkinTopology::for_variant(variant);
            for y in 0..64 {
                for x in 0..64 {
                    let hits = topo.regions.iter().filter(|r| r.contains(x, y)).count();
                    assert!(hits <= 1, "({x},{y}) inside {hits} regions");
                }
            }
        }
    }

    #[test]
    fn canonical_face_rects() {
        let topo = SkinTopology::for_variant(ModelVariant::Wide);
        let front = topo.region_by_name("head-front").unwrap();
        assert_eq!((front.x, front.y, front.width, front.height), (8, 8, 8, 8));
        let hat = topo.region_by_name("hat-front").unwrap();
        assert_eq!((hat.x, hat.y), (40, 8));
        assert_eq!(hat.uv_layer, 2);
        let body_right = topo.region_by_name("body-right").unwrap();
        assert_eq!((body_right.x, body_right.y, body_right.width, body_right.height), (16, 20, 4, 12));
        let arm_front = topo.region_by_name("right-arm-front").unwrap();
        assert_eq!((arm_front.x, arm_front.y, arm_front.width), (44, 20, 4));
    }

    #[test]
    fn slim_arms_are_three_wide() {
        let topo = SkinTopology::for_variant(ModelVariant::Slim);
        let arm_front = topo.region_by_name("right-arm-front").unwrap();
        assert_eq!(arm_front.width, 3);
        let sleeve_back = topo.region_by_name("left-sleeve-back").unwrap();
        assert_eq!(sleeve_back.width, 3);
        // Legs are unaffected by the variant.
        let leg = topo.region_by_name("left-leg-front").unwrap();
        assert_eq!(leg.width, 4);
    }

    #[test]
    fn part_keys_separate_base_and_overlay() {
        let topo = SkinTopology::for_variant(ModelVariant::Wide);
        let head = topo.region_at(10, 10).unwrap();
        let hat = topo.region_at(42, 10).unwrap();
        assert_eq!(head.part, BodyPart::Head);
        assert_eq!(hat.part, BodyPart::Head);
        assert_ne!(head.key(), hat.key());
        assert_eq!(hat.key().display_name(), "head-overlay");
    }

    #[test]
    fn connected_edge_runs_have_matching_lengths() {
        for variant in [ModelVariant::Wide, ModelVariant::Slim] {
            let topo = SkinTopology::for_variant(variant);
            for conn in &topo.connections {
                let a = topo.region_by_name(conn.face_a).unwrap();
                let b = topo.region_by_name(conn.face_b).unwrap();
                let run_a = SkinTopology::edge_run(a, conn.edge_a);
                let run_b = SkinTopology::edge_run(b, conn.edge_b);
                assert_eq!(
                    run_a.len(),
                    run_b.len(),
                    "{} {:?} vs {} {:?}",
                    conn.face_a,
                    conn.edge_a,
                    conn.face_b,
                    conn.edge_b
                );
            }
        }
    }

    #[test]
    fn uncovered_pixels_exist_only_outside_regions() {
        // The canonical wide table covers every face; spot-check that a known
        // unused atlas cell maps to no region.
        let topo = SkinTopology::for_variant(ModelVariant::Wide);
        assert!(topo.region_at(0, 0).is_none()); // corner left of head-top
        assert!(topo.region_at(63, 0).is_none());
    }
}
