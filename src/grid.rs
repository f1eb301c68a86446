use crate::color::Rgba;

/// Canonical Minecraft skin atlas size.
pub const SKIN_SIZE: u32 = 64;

// ============================================================================
// PIXEL GRID — fixed-size grid of optional RGBA pixels
// ============================================================================

/// A fixed-size grid of `Option<Rgba>` pixels, one per layer.
///
/// `None` and "alpha 0" collapse to the same stored state: writes of
/// fully-transparent colors are normalized to `None` so that equality,
/// serialization and compositing all agree on what "empty" means.
///
/// Out-of-range reads return `None`; out-of-range writes are silently
/// ignored (UI input is already clamped, bounds-checks here are the
/// last line of defense, not an error condition).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<Option<Rgba>>,
}

impl PixelGrid {
    /// Create an empty (fully transparent) grid at the canonical 64×64 size.
    pub fn new() -> Self {
        Self::with_size(SKIN_SIZE, SKIN_SIZE)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![None; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some((y * self.width + x) as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        self.index(x, y).and_then(|i| self.pixels[i])
    }

    /// True when the pixel at (x, y) has alpha > 0.
    #[inline]
    pub fn is_opaque(&self, x: u32, y: u32) -> bool {
        self.get(x, y).is_some()
    }

    /// Write one pixel. Transparent colors (alpha 0) are stored as `None`.
    pub fn set(&mut self, x: u32, y: u32, pixel: Option<Rgba>) {
        let Some(i) = self.index(x, y) else { return };
        self.pixels[i] = normalize(pixel);
    }

    /// Erase one pixel (same as writing a transparent color).
    pub fn clear(&mut self, x: u32, y: u32) {
        self.set(x, y, None);
    }

    /// Fill a rectangle, clipped to the grid bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, pixel: Option<Rgba>) {
        let pixel = normalize(pixel);
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y.min(self.height)..y_end {
            for px in x.min(self.width)..x_end {
                self.pixels[(py * self.width + px) as usize] = pixel;
            }
        }
    }

    /// Remove every pixel.
    pub fn clear_all(&mut self) {
        self.pixels.fill(None);
    }

    /// Iterate over all set pixels as `(x, y, color)`.
    pub fn iter_set(&self) -> impl Iterator<Item = (u32, u32, Rgba)> + '_ {
        self.pixels.iter().enumerate().filter_map(move |(i, p)| {
            p.map(|c| (i as u32 % self.width, i as u32 / self.width, c))
        })
    }

    /// Number of set (non-transparent) pixels.
    pub fn count_set(&self) -> usize {
        self.pixels.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.iter().all(|p| p.is_none())
    }

    // ---- byte-buffer transfer ----------------------------------------------
    // Flat RGBA8 row-major encoding, used to move grids across the offload
    // boundary and to hand composites to texture consumers.

    /// Encode as a flat `width * height * 4` RGBA byte buffer, row-major,
    /// top-to-bottom. Empty pixels encode as four zero bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; (self.width * self.height * 4) as usize];
        for (i, p) in self.pixels.iter().enumerate() {
            if let Some(c) = p {
                out[i * 4..i * 4 + 4].copy_from_slice(&c.to_array());
            }
        }
        out
    }

    /// Decode from a flat RGBA byte buffer. Returns `None` when the buffer
    /// length does not match `width * height * 4`. Zero-alpha pixels decode
    /// as empty entries.
    pub fn from_bytes(width: u32, height: u32, data: &[u8]) -> Option<Self> {
        if data.len() != (width * height * 4) as usize {
            return None;
        }
        let pixels = data
            .chunks_exact(4)
            .map(|c| normalize(Some(Rgba::new(c[0], c[1], c[2], c[3]))))
            .collect();
        Some(Self { width, height, pixels })
    }
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse zero-alpha pixels to `None`.
#[inline]
fn normalize(pixel: Option<Rgba>) -> Option<Rgba> {
    match pixel {
        Some(c) if c.a == 0 => None,
        other => other,
    }
}

// ============================================================================
// TESTS
// ============================================================================
