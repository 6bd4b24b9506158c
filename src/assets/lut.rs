use crate::foundation::error::{CamflowError, CamflowResult};
use anyhow::Context as _;

/// 3D colour lookup table with `size` samples per axis.
///
/// Entries are stored red-fastest (`r + g * n + b * n * n`) as normalized RGB.
#[derive(Clone, Debug, PartialEq)]
pub struct Lut3d {
    size: u32,
    table: Vec<[f32; 3]>,
}

impl Lut3d {
    /// Identity table: `apply` returns its input (up to rounding).
    pub fn identity(size: u32) -> CamflowResult<Self> {
        if size < 2 {
            return Err(CamflowError::validation("lut size must be >= 2"));
        }
        let n = size as usize;
        let max = (size - 1) as f32;
        let mut table = Vec::with_capacity(n * n * n);
        for b in 0..n {
            for g in 0..n {
                for r in 0..n {
                    table.push([r as f32 / max, g as f32 / max, b as f32 / max]);
                }
            }
        }
        Ok(Self { size, table })
    }

    /// Build a table by evaluating `f` at every lattice point (inputs normalized to `0..=1`).
    pub fn from_fn(size: u32, mut f: impl FnMut([f32; 3]) -> [f32; 3]) -> CamflowResult<Self> {
        let mut lut = Self::identity(size)?;
        for entry in &mut lut.table {
            let [r, g, b] = f(*entry);
            *entry = [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)];
        }
        Ok(lut)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Decode an encoded LUT image (PNG or any format `image` reads).
    ///
    /// Two layouts are accepted:
    /// - square tiles: a `t^3 x t^3` image holding `t*t` tiles of `t^2 x t^2`, blue selects the
    ///   tile (row-major), red runs along x and green along y inside a tile;
    /// - strip: an `n*n x n` image holding `n` tiles side by side, blue selects the tile.
    pub fn decode(bytes: &[u8]) -> CamflowResult<Self> {
        let img = image::load_from_memory(bytes)
            .context("decode lut image")?
            .to_rgba8();
        Self::from_image(&img)
    }

    pub fn from_image(img: &image::RgbaImage) -> CamflowResult<Self> {
        let (w, h) = img.dimensions();
        if let Some(n) = strip_size(w, h) {
            return Ok(Self::sample_tiles(img, n, n));
        }
        if w == h
            && let Some(t) = integer_cbrt(w)
            && t >= 2
        {
            return Ok(Self::sample_tiles(img, t * t, t));
        }
        Err(CamflowError::asset(format!(
            "unsupported lut image layout {w}x{h} (expected t^3 x t^3 tiles or n*n x n strip)"
        )))
    }

    fn sample_tiles(img: &image::RgbaImage, n: u32, tiles_per_row: u32) -> Self {
        let mut table = Vec::with_capacity((n * n * n) as usize);
        for b in 0..n {
            let tile_x = (b % tiles_per_row) * n;
            let tile_y = (b / tiles_per_row) * n;
            for g in 0..n {
                for r in 0..n {
                    let px = img.get_pixel(tile_x + r, tile_y + g).0;
                    table.push([
                        px[0] as f32 / 255.0,
                        px[1] as f32 / 255.0,
                        px[2] as f32 / 255.0,
                    ]);
                }
            }
        }
        Self { size: n, table }
    }

    /// Encode the table in strip layout (`n*n x n`).
    pub fn to_strip_image(&self) -> image::RgbaImage {
        let n = self.size;
        image::RgbaImage::from_fn(n * n, n, |x, y| {
            let [r, g, b] = self.entry(x % n, y, x / n);
            image::Rgba([to_u8(r), to_u8(g), to_u8(b), 255])
        })
    }

    /// Texel data for a `size^3` RGBA8 volume, x = red, y = green, z = blue.
    pub fn to_rgba8_volume(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.table.len() * 4);
        for [r, g, b] in &self.table {
            out.extend_from_slice(&[to_u8(*r), to_u8(*g), to_u8(*b), 255]);
        }
        out
    }

    fn entry(&self, r: u32, g: u32, b: u32) -> [f32; 3] {
        let n = self.size as usize;
        self.table[r as usize + g as usize * n + b as usize * n * n]
    }

    /// Map one straight-alpha RGB triple through the table with trilinear interpolation.
    pub fn apply(&self, rgb: [u8; 3]) -> [u8; 3] {
        let max = (self.size - 1) as f32;
        let pos = rgb.map(|c| c as f32 / 255.0 * max);
        let lo = pos.map(|p| (p.floor() as u32).min(self.size - 1));
        let hi = lo.map(|l| (l + 1).min(self.size - 1));
        let t = [
            pos[0] - lo[0] as f32,
            pos[1] - lo[1] as f32,
            pos[2] - lo[2] as f32,
        ];

        let lerp = |a: [f32; 3], b: [f32; 3], t: f32| -> [f32; 3] {
            [
                a[0] + (b[0] - a[0]) * t,
                a[1] + (b[1] - a[1]) * t,
                a[2] + (b[2] - a[2]) * t,
            ]
        };

        let c00 = lerp(self.entry(lo[0], lo[1], lo[2]), self.entry(hi[0], lo[1], lo[2]), t[0]);
        let c10 = lerp(self.entry(lo[0], hi[1], lo[2]), self.entry(hi[0], hi[1], lo[2]), t[0]);
        let c01 = lerp(self.entry(lo[0], lo[1], hi[2]), self.entry(hi[0], lo[1], hi[2]), t[0]);
        let c11 = lerp(self.entry(lo[0], hi[1], hi[2]), self.entry(hi[0], hi[1], hi[2]), t[0]);
        let c0 = lerp(c00, c10, t[1]);
        let c1 = lerp(c01, c11, t[1]);
        lerp(c0, c1, t[2]).map(to_u8)
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn strip_size(w: u32, h: u32) -> Option<u32> {
    (h >= 2 && h.checked_mul(h) == Some(w)).then_some(h)
}

fn integer_cbrt(v: u32) -> Option<u32> {
    let guess = (v as f64).cbrt().round() as u32;
    (guess.checked_pow(3) == Some(v)).then_some(guess)
}
