use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// RGBA PIXEL TYPE
// ============================================================================

/// An 8-bit RGBA color. Alpha 0 means fully transparent; transparent pixels
/// are normalized to zeroed RGB before storage so equality and serialization
/// stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_array(v: [u8; 4]) -> Self {
        Self { r: v[0], g: v[1], b: v[2], a: v[3] }
    }

    /// True for colors where R == G == B (no hue to shift).
    pub fn is_achromatic(self) -> bool {
        self.r == self.g && self.g == self.b
    }
}

/// Euclidean distance between two colors in RGB space (alpha ignored).
/// Range [0, ~441.67]; this is the sole similarity metric used by the
/// segmentation and merge operations.
pub fn color_distance(a: Rgba, b: Rgba) -> f32 {
    let dr = a.r as f32 - b.r as f32;
    let dg = a.g as f32 - b.g as f32;
    let db = a.b as f32 - b.b as f32;
    (dr * dr + dg * dg + db * db).sqrt()
}

pub fn are_similar(a: Rgba, b: Rgba, threshold: f32) -> bool {
    color_distance(a, b) <= threshold
}

// ============================================================================
// COLOR SPACE HELPERS
// ============================================================================

/// RGB (0..1) → HSL (H: 0..1, S: 0..1, L: 0..1)
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < 1e-6 {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };

    let h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / d;
        if h < 0.0 { h += 6.0; }
        h / 6.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, l)
}

/// HSL (H: 0..1, S: 0..1, L: 0..1) → RGB (0..1)
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    let r = hue_to_rgb(p, q, h + 1.0 / 3.0);
    let g = hue_to_rgb(p, q, h);
    let b = hue_to_rgb(p, q, h - 1.0 / 3.0);

    (r, g, b)
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 { t += 1.0; }
    if t > 1.0 { t -= 1.0; }
    if t < 1.0 / 6.0 { return p + (q - p) * 6.0 * t; }
    if t < 1.0 / 2.0 { return q; }
    if t < 2.0 / 3.0 { return p + (q - p) * (2.0 / 3.0 - t) * 6.0; }
    p
}

// ============================================================================
// NOISE PRIMITIVES
// ============================================================================

/// Which way a noise primitive is allowed to push a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NoiseDirection {
    /// Only increase (brighten / shift hue forward).
    Up,
    /// Only decrease.
    Down,
    /// Symmetric range around zero.
    #[default]
    Both,
}

/// Surface material of a layer; selects the noise recipe used when a
/// single-color layer is re-rendered with noise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Material {
    Hair,
    Cloth,
    Skin,
    Metal,
    Plastic,
    #[default]
    Other,
}

impl Material {
    pub fn all() -> &'static [Material] {
        &[
            Material::Hair,
            Material::Cloth,
            Material::Skin,
            Material::Metal,
            Material::Plastic,
            Material::Other,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Material::Hair => "hair",
            Material::Cloth => "cloth",
            Material::Skin => "skin",
            Material::Metal => "metal",
            Material::Plastic => "plastic",
            Material::Other => "other",
        }
    }

    /// Convert to a stable u8 for project serialization
    pub fn to_u8(&self) -> u8 {
        match self {
            Material::Hair => 0,
            Material::Cloth => 1,
            Material::Skin => 2,
            Material::Metal => 3,
            Material::Plastic => 4,
            Material::Other => 5,
        }
    }

    /// Reconstruct from a u8 (defaults to Other for unknown values)
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Material::Hair,
            1 => Material::Cloth,
            2 => Material::Skin,
            3 => Material::Metal,
            4 => Material::Plastic,
            _ => Material::Other,
        }
    }
}

fn clamp_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Draw a signed delta inside the direction-restricted range `[-max, +max]`.
fn draw_delta<R: Rng>(rng: &mut R, max: f32, direction: NoiseDirection) -> f32 {
    if max <= 0.0 {
        return 0.0;
    }
    match direction {
        NoiseDirection::Up => rng.gen_range(0.0..=max),
        NoiseDirection::Down => -rng.gen_range(0.0..=max),
        NoiseDirection::Both => rng.gen_range(-max..=max),
    }
}

/// Add one random delta (a single draw, applied uniformly to R, G and B)
/// of at most `intensity`% of the 0–255 range, then clamp each channel.
/// Intensity 0 is exact identity.
pub fn apply_brightness_noise<R: Rng>(
    color: Rgba,
    intensity: u8,
    direction: NoiseDirection,
    rng: &mut R,
) -> Rgba {
    if intensity == 0 {
        return color;
    }
    let max_delta = intensity.min(100) as f32 / 100.0 * 255.0;
    let delta = draw_delta(rng, max_delta, direction);
    Rgba {
        r: clamp_channel(color.r as f32 + delta),
        g: clamp_channel(color.g as f32 + delta),
        b: clamp_channel(color.b as f32 + delta),
        a: color.a,
    }
}

/// Maximum hue shift at intensity 100, in turns (≈ ±36°).
const HUE_SHIFT_SCALE: f32 = 0.1;
/// Maximum saturation shift at intensity 100.
const SATURATION_SHIFT_SCALE: f32 = 0.3;

/// Shift the hue by a random amount scaled to `intensity`. Achromatic colors
/// (equal channels) have no hue and are returned unchanged.
pub fn apply_hue_shift<R: Rng>(
    color: Rgba,
    intensity: u8,
    direction: NoiseDirection,
    rng: &mut R,
) -> Rgba {
    if intensity == 0 || color.is_achromatic() {
        return color;
    }
    let max_shift = intensity.min(100) as f32 / 100.0 * HUE_SHIFT_SCALE;
    let shift = draw_delta(rng, max_shift, direction);

    let (h, s, l) = rgb_to_hsl(
        color.r as f32 / 255.0,
        color.g as f32 / 255.0,
        color.b as f32 / 255.0,
    );
    let nh = (h + shift).rem_euclid(1.0);
    let (r, g, b) = hsl_to_rgb(nh, s, l);
    Rgba {
        r: clamp_channel(r * 255.0),
        g: clamp_channel(g * 255.0),
        b: clamp_channel(b * 255.0),
        a: color.a,
    }
}

/// Shift the saturation by a random amount scaled to `intensity`, clamped to
/// [0, 1]. Achromatic colors are returned unchanged.
pub fn apply_saturation_shift<R: Rng>(
    color: Rgba,
    intensity: u8,
    direction: NoiseDirection,
    rng: &mut R,
) -> Rgba {
    if intensity == 0 || color.is_achromatic() {
        return color;
    }
    let max_shift = intensity.min(100) as f32 / 100.0 * SATURATION_SHIFT_SCALE;
    let shift = draw_delta(rng, max_shift, direction);

    let (h, s, l) = rgb_to_hsl(
        color.r as f32 / 255.0,
        color.g as f32 / 255.0,
        color.b as f32 / 255.0,
    );
    let ns = (s + shift).clamp(0.0, 1.0);
    let (r, g, b) = hsl_to_rgb(h, ns, l);
    Rgba {
        r: clamp_channel(r * 255.0),
        g: clamp_channel(g * 255.0),
        b: clamp_channel(b * 255.0),
        a: color.a,
    }
}

// ============================================================================
// MATERIAL RECIPES
// ============================================================================
//
// Per-material multipliers and biases. These are tuned presentation
// constants; the only hard contracts are "intensity 0 is identity" and the
// documented direction biases.

/// Hair: chance that the brightness pass darkens regardless of the caller's
/// direction.
const HAIR_DARKEN_BIAS: f64 = 0.7;
const HAIR_BRIGHTNESS_MUL: f32 = 1.2;
const HAIR_HUE_MUL: f32 = 0.6;

const CLOTH_SATURATION_MUL: f32 = 0.5;

const SKIN_BRIGHTNESS_MUL: f32 = 0.5;
const SKIN_HUE_MUL: f32 = 0.4;

/// Metal: chance of a brightening "highlight" pass instead of darkening.
const METAL_HIGHLIGHT_CHANCE: f64 = 0.3;
const METAL_HIGHLIGHT_MUL: f32 = 2.0;
const METAL_DARKEN_MUL: f32 = 0.8;
const METAL_HUE_MUL: f32 = 0.2;

const PLASTIC_BRIGHTNESS_MUL: f32 = 0.7;
const PLASTIC_SATURATION_MUL: f32 = 0.6;
const PLASTIC_HUE_MUL: f32 = 0.15;

fn scaled_intensity(intensity: u8, mul: f32) -> u8 {
    (intensity as f32 * mul).round().min(100.0) as u8
}

/// Apply a fixed per-material recipe combining the brightness/hue/saturation
/// primitives. Pure except for the RNG; intensity 0 on both axes is exact
/// identity for every material.
pub fn apply_material_noise<R: Rng>(
    color: Rgba,
    brightness: u8,
    hue: u8,
    brightness_dir: NoiseDirection,
    hue_dir: NoiseDirection,
    material: Material,
    rng: &mut R,
) -> Rgba {
    match material {
        Material::Hair => {
            let dir = if rng.gen_bool(HAIR_DARKEN_BIAS) {
                NoiseDirection::Down
            } else {
                brightness_dir
            };
            let c = apply_brightness_noise(
                color,
                scaled_intensity(brightness, HAIR_BRIGHTNESS_MUL),
                dir,
                rng,
            );
            apply_hue_shift(c, scaled_intensity(hue, HAIR_HUE_MUL), hue_dir, rng)
        }
        Material::Cloth => {
            let c = apply_brightness_noise(color, brightness, brightness_dir, rng);
            let c = apply_hue_shift(c, hue, hue_dir, rng);
            apply_saturation_shift(
                c,
                scaled_intensity(hue, CLOTH_SATURATION_MUL),
                NoiseDirection::Both,
                rng,
            )
        }
        Material::Skin => {
            let c = apply_brightness_noise(
                color,
                scaled_intensity(brightness, SKIN_BRIGHTNESS_MUL),
                brightness_dir,
                rng,
            );
            apply_hue_shift(c, scaled_intensity(hue, SKIN_HUE_MUL), hue_dir, rng)
        }
        Material::Metal => {
            let (mul, dir) = if rng.gen_bool(METAL_HIGHLIGHT_CHANCE) {
                (METAL_HIGHLIGHT_MUL, NoiseDirection::Up)
            } else {
                (METAL_DARKEN_MUL, NoiseDirection::Down)
            };
            let c = apply_brightness_noise(color, scaled_intensity(brightness, mul), dir, rng);
            apply_hue_shift(c, scaled_intensity(hue, METAL_HUE_MUL), hue_dir, rng)
        }
        Material::Plastic => {
            let c = apply_brightness_noise(
                color,
                scaled_intensity(brightness, PLASTIC_BRIGHTNESS_MUL),
                brightness_dir,
                rng,
            );
            let c = apply_hue_shift(c, scaled_intensity(hue, PLASTIC_HUE_MUL), hue_dir, rng);
            apply_saturation_shift(
                c,
                scaled_intensity(hue, PLASTIC_SATURATION_MUL),
                NoiseDirection::Both,
                rng,
            )
        }
        Material::Other => {
            let c = apply_brightness_noise(color, brightness, brightness_dir, rng);
            apply_hue_shift(c, hue, hue_dir, rng)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
