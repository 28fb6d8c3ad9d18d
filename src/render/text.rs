use fontdue::{Font, FontSettings};
use std::collections::HashMap;
use std::path::Path;

use super::layers::Rect;
use super::surface::Surface;

/// Fonts found in a directory, keyed by file name.
#[derive(Default)]
pub struct FontBook {
    fonts: HashMap<String, Font>,
}

impl FontBook {
    /// Load every `.ttf` / `.otf` file in `dir`. Unreadable files are logged and skipped.
    pub fn load_dir(dir: &Path) -> Self {
        let mut book = FontBook::default();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Font directory {} unavailable: {}", dir.display(), e);
                return book;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_font = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"))
                .unwrap_or(false);
            if !is_font {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            match std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| Font::from_bytes(bytes, FontSettings::default()).map_err(str::to_owned))
            {
                Ok(font) => {
                    log::debug!("Loaded font {}", name);
                    book.fonts.insert(name, font);
                }
                Err(e) => log::warn!("Failed to load font {}: {}", path.display(), e),
            }
        }
        log::info!("Loaded {} fonts from {}", book.fonts.len(), dir.display());
        book
    }

    /// Font by file name; a missing font is logged once per lookup.
    pub fn get(&self, name: &str) -> Option<&Font> {
        let font = self.fonts.get(name);
        if font.is_none() {
            log::warn!("Font {} not found, text omitted", name);
        }
        font
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.fonts.len()
    }
}

/// A font at a size and colour (straight alpha).
pub struct TextStyle<'a> {
    pub font: &'a Font,
    pub size: f32,
    pub color: [u8; 4],
}

impl TextStyle<'_> {
    /// Width of rendered text in pixels.
    pub fn measure_width(&self, text: &str) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, self.size).advance_width)
            .sum()
    }

    pub fn ascent(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.size)
            .map(|m| m.ascent)
            .unwrap_or(self.size * 0.8)
    }

    /// Draw one line with its baseline at `baseline_y`.
    pub fn draw_line(&self, surface: &mut Surface, text: &str, x: f32, baseline_y: f32) {
        let (width, height) = (surface.width() as i32, surface.height() as i32);
        let color_alpha = self.color[3] as f32 / 255.0;
        let data = surface.data_mut();
        let mut cursor_x = x;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.size);
            let glyph_x = (cursor_x + metrics.xmin as f32).round() as i32;
            let glyph_y = (baseline_y - metrics.height as f32 - metrics.ymin as f32).round() as i32;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    let px = glyph_x + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width || py >= height {
                        continue;
                    }

                    let idx = ((py * width + px) * 4) as usize;
                    let a = coverage as f32 / 255.0 * color_alpha;
                    let inv_a = 1.0 - a;
                    for c in 0..3 {
                        data[idx + c] = (self.color[c] as f32 * a + data[idx + c] as f32 * inv_a).round() as u8;
                    }
                    data[idx + 3] = (255.0 * a + data[idx + 3] as f32 * inv_a).round() as u8;
                }
            }

            cursor_x += metrics.advance_width;
        }
    }
}

/// Top-left x and baseline-relative top y of each line of a block centred in
/// `rect`. Lines advance by `size * line_spacing`.
pub fn layout_centered(widths: &[f32], size: f32, line_spacing: f32, rect: Rect) -> Vec<(f32, f32)> {
    let advance = size * line_spacing;
    let block_height = advance * widths.len() as f32;
    let top = rect.y as f32 + (rect.height as f32 - block_height) / 2.0;
    widths
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let x = rect.x as f32 + (rect.width as f32 - w) / 2.0;
            (x, top + advance * i as f32)
        })
        .collect()
}

/// Draw the non-empty `lines` as a block centred in `rect`.
pub fn draw_centered_block(
    surface: &mut Surface,
    style: &TextStyle,
    lines: &[&str],
    line_spacing: f32,
    rect: Rect,
) {
    let lines: Vec<&str> = lines.iter().copied().filter(|l| !l.trim().is_empty()).collect();
    let widths: Vec<f32> = lines.iter().map(|l| style.measure_width(l)).collect();
    let ascent = style.ascent();
    for (line, (x, top)) in lines
        .iter()
        .zip(layout_centered(&widths, style.size, line_spacing, rect))
    {
        style.draw_line(surface, line, x, top + ascent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    #[test]
    fn block_is_centred_in_rect() {
        let rect = Rect {
            x: 100,
            y: 50,
            width: 400,
            height: 200,
        };
        let placed = layout_centered(&[100.0, 300.0], 40.0, 1.1, rect);
        assert_eq!(placed.len(), 2);
        assert!((placed[0].0 - 250.0).abs() < 1e-4);
        assert!((placed[1].0 - 150.0).abs() < 1e-4);
        // Block is 88 px tall: top at 50 + (200 - 88) / 2.
        assert!((placed[0].1 - 106.0).abs() < 1e-4);
        assert!((placed[1].1 - 150.0).abs() < 1e-4);
    }

    #[test]
    fn missing_font_directory_gives_empty_book() {
        let book = FontBook::load_dir(Path::new("/definitely/not/here"));
        assert_eq!(book.len(), 0);
        assert!(book.get("Roboto-Regular.ttf").is_none());
    }

    #[test]
    fn draws_text_when_a_system_font_exists() {
        let Ok(bytes) = std::fs::read(SYSTEM_FONT) else {
            return;
        };
        let font = Font::from_bytes(bytes, FontSettings::default()).unwrap();
        let style = TextStyle {
            font: &font,
            size: 24.0,
            color: [255, 255, 255, 255],
        };
        let mut surface = Surface::new(200, 60);
        let rect = Rect {
            x: 0,
            y: 0,
            width: 200,
            height: 60,
        };
        draw_centered_block(&mut surface, &style, &["Title", "", "Artist"], 1.1, rect);
        assert!(surface.data().chunks_exact(4).any(|p| p[3] > 0));
        // Nothing drawn in the far corners.
        assert_eq!(surface.pixel(0, 0)[3], 0);
        assert_eq!(surface.pixel(199, 59)[3], 0);
    }
}
