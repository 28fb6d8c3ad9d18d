//! Premultiplied RGBA8 raster used for every layer of a frame.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use rand::Rng;
use std::path::Path;
use std::time::Duration;

use crate::error::DrawError;

#[inline]
pub fn premultiply(c: u8, a: u8) -> u8 {
    ((c as u32 * a as u32 + 127) / 255) as u8
}

#[inline]
pub fn unpremultiply(c: u8, a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
}

/// Per-channel pixel offsets for the shake effect, `[r, g, b]` as `(dx, dy)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelOffsets(pub [(i32, i32); 3]);

impl ChannelOffsets {
    /// Uniform integer offsets in `[-max, max]`; `red_only` copies red's to
    /// the other two channels.
    pub fn random<R: Rng>(rng: &mut R, max: f64, red_only: bool) -> Self {
        let m = if max.is_finite() { max.max(0.0) as i32 } else { 0 };
        let mut draw = || (rng.random_range(-m..=m), rng.random_range(-m..=m));
        let red = draw();
        if red_only {
            Self([red; 3])
        } else {
            Self([red, draw(), draw()])
        }
    }
}

#[derive(Clone, Debug)]
pub struct Surface {
    /// Premultiplied pixels.
    image: RgbaImage,
}

impl Surface {
    /// Transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    /// Surface filled with a straight (non-premultiplied) colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut surface = Self::new(width, height);
        surface.fill(rgba);
        surface
    }

    /// Wrap straight-alpha pixels.
    pub fn from_image(mut image: RgbaImage) -> Self {
        for p in image.pixels_mut() {
            let a = p.0[3];
            for c in 0..3 {
                p.0[c] = premultiply(p.0[c], a);
            }
        }
        Self { image }
    }

    /// Straight-alpha copy for encoding.
    pub fn to_image(&self) -> RgbaImage {
        let mut out = self.image.clone();
        for p in out.pixels_mut() {
            let a = p.0[3];
            for c in 0..3 {
                p.0[c] = unpremultiply(p.0[c], a);
            }
        }
        out
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        let a = rgba[3];
        let px = [
            premultiply(rgba[0], a),
            premultiply(rgba[1], a),
            premultiply(rgba[2], a),
            a,
        ];
        for p in self.image.pixels_mut() {
            p.0 = px;
        }
    }

    pub fn clear(&mut self) {
        self.data_mut().fill(0);
    }

    pub fn copy_from(&mut self, src: &Surface) -> Result<(), DrawError> {
        self.check_size(src)?;
        self.data_mut().copy_from_slice(src.data());
        Ok(())
    }

    fn check_size(&self, other: &Surface) -> Result<(), DrawError> {
        if self.size() != other.size() {
            return Err(DrawError::SizeMismatch {
                expected: self.size(),
                got: other.size(),
            });
        }
        Ok(())
    }

    /// Source-over of a same-sized surface at `opacity`.
    pub fn blend(&mut self, src: &Surface, opacity: f32) -> Result<(), DrawError> {
        self.check_size(src)?;
        self.blend_at(src, 0, 0, opacity);
        Ok(())
    }

    /// Source-over of `src` with its top-left corner at (`x`, `y`), clipped.
    pub fn blend_at(&mut self, src: &Surface, x: i32, y: i32, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 {
            return;
        }
        let (dw, dh) = (self.width() as i32, self.height() as i32);
        let (sw, sh) = (src.width() as i32, src.height() as i32);
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + sw).min(dw);
        let y1 = (y + sh).min(dh);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let src_data = src.data();
        let dst_width = self.width() as usize;
        let dst = self.data_mut();
        for dy in y0..y1 {
            let sy = (dy - y) as usize;
            for dx in x0..x1 {
                let sx = (dx - x) as usize;
                let si = (sy * sw as usize + sx) * 4;
                let di = (dy as usize * dst_width + dx as usize) * 4;
                let sa = src_data[si + 3] as f32 * opacity;
                if sa <= 0.0 {
                    continue;
                }
                let inv = 1.0 - sa / 255.0;
                for c in 0..4 {
                    let s = src_data[si + c] as f32 * opacity;
                    let d = dst[di + c] as f32;
                    dst[di + c] = (s + d * inv).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }

    /// Resampled copy (bilinear).
    pub fn scaled(&self, width: u32, height: u32) -> Surface {
        if self.size() == (width, height) {
            return self.clone();
        }
        Surface {
            image: imageops::resize(&self.image, width.max(1), height.max(1), FilterType::Triangle),
        }
    }

    /// Multiply every pixel by the alpha of the same pixel in `mask`.
    pub fn mask_alpha(&mut self, mask: &Surface) -> Result<(), DrawError> {
        self.check_size(mask)?;
        let mask = mask.data();
        for (px, m) in self.data_mut().chunks_exact_mut(4).zip(mask.chunks_exact(4)) {
            let a = m[3] as u32;
            for c in px.iter_mut() {
                *c = ((*c as u32 * a + 127) / 255) as u8;
            }
        }
        Ok(())
    }

    /// Channel-shifted copy of this surface written into `out`.
    ///
    /// Source channel `c` of pixel (x, y) lands on
    /// `((x + dx_c) mod w, (y + dy_c) mod h)`. Colour is moved un-premultiplied
    /// and re-premultiplied with the destination alpha, which is the mean of
    /// the three source alphas sampled for that pixel.
    pub fn shake_into(&self, offsets: &ChannelOffsets, out: &mut Surface) -> Result<(), DrawError> {
        out.check_size(self)?;
        let (w, h) = (self.width() as i64, self.height() as i64);
        if w == 0 || h == 0 {
            return Ok(());
        }
        let src = self.data();
        let dst = out.data_mut();

        for y in 0..h {
            for x in 0..w {
                let mut straight = [0u8; 3];
                let mut alpha_sum = 0u32;
                for (c, &(dx, dy)) in offsets.0.iter().enumerate() {
                    let sx = (x - dx as i64).rem_euclid(w);
                    let sy = (y - dy as i64).rem_euclid(h);
                    let si = ((sy * w + sx) * 4) as usize;
                    let a = src[si + 3];
                    straight[c] = unpremultiply(src[si + c], a);
                    alpha_sum += a as u32;
                }
                let a = ((alpha_sum + 1) / 3) as u8;
                let di = ((y * w + x) * 4) as usize;
                for c in 0..3 {
                    dst[di + c] = premultiply(straight[c], a);
                }
                dst[di + 3] = a;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn shaken(&self, offsets: &ChannelOffsets) -> Surface {
        let mut out = Surface::new(self.width(), self.height());
        // Sizes match by construction.
        let _ = self.shake_into(offsets, &mut out);
        out
    }

    pub fn load_png(path: &Path) -> Result<Surface> {
        let image = image::open(path)
            .with_context(|| format!("Failed to load image: {}", path.display()))?
            .to_rgba8();
        Ok(Surface::from_image(image))
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.to_image()
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Load an image, retrying a few times with a warning per failed attempt.
pub fn load_png_with_retry(path: &Path, attempts: u32, delay: Duration) -> Result<Surface> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match Surface::load_png(path) {
            Ok(surface) => return Ok(surface),
            Err(e) if attempt < attempts => {
                log::warn!("Attempt {}/{} failed: {:#}", attempt, attempts, e);
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
