//! Frame layout and the static layers built once before rendering.

use anyhow::Result;
use std::path::Path;

use crate::config::{Config, FontConfig, LayoutVariant};

use super::surface::Surface;
use super::text::{draw_centered_block, FontBook, TextStyle};

/// Layout coordinates are authored for this frame size.
const REFERENCE_WIDTH: f64 = 1920.0;
const REFERENCE_HEIGHT: f64 = 1080.0;

const TITLE_LINE_SPACING: f32 = 1.1;
const WHITE: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Where every element of a frame goes, in output pixels.
#[derive(Debug, Clone)]
pub struct Layout {
    pub variant: LayoutVariant,
    pub width: u32,
    pub height: u32,
    pub art: Rect,
    pub title: Rect,
    pub waveform: Rect,
    pub spectrum: Rect,
}

impl Layout {
    pub fn new(variant: LayoutVariant, width: u32, height: u32) -> Self {
        let mut layout = Self {
            variant,
            width,
            height,
            art: Rect { x: 0, y: 0, width: 0, height: 0 },
            title: Rect { x: 0, y: 0, width: 0, height: 0 },
            waveform: Rect { x: 0, y: 0, width: 0, height: 0 },
            spectrum: Rect { x: 0, y: 0, width: 0, height: 0 },
        };
        match variant {
            LayoutVariant::Circle => {
                layout.title = layout.scale_rect(24.0, 900.0, 1872.0, 156.0);
            }
            LayoutVariant::Classic => {
                layout.art = layout.scale_rect(24.0, 24.0, 917.0, 812.0);
                layout.title = layout.scale_rect(979.0, 24.0, 917.0, 387.0);
                layout.waveform = layout.scale_rect(979.0, 449.0, 917.0, 387.0);
                layout.spectrum = layout.scale_rect(979.0, 24.0, 917.0, 387.0);
            }
        }
        layout
    }

    pub fn scale_x(&self) -> f64 {
        self.width as f64 / REFERENCE_WIDTH
    }

    pub fn scale_y(&self) -> f64 {
        self.height as f64 / REFERENCE_HEIGHT
    }

    /// Rectangle given in 1920x1080 coordinates, mapped to this frame.
    pub fn scale_rect(&self, x: f64, y: f64, width: f64, height: f64) -> Rect {
        let (sx, sy) = (self.scale_x(), self.scale_y());
        Rect {
            x: (x * sx).round() as i32,
            y: (y * sy).round() as i32,
            width: ((width * sx).round() as u32).max(1),
            height: ((height * sy).round() as u32).max(1),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Radius of the quiet spectrum ring (and of the emblem).
    pub fn base_radius(&self) -> f64 {
        self.height as f64 * 0.25
    }

    pub fn max_radius(&self) -> f64 {
        self.height as f64 * 0.5
    }

    /// Top-left corner and side of the moving circle for frame `index`: it
    /// sweeps left to right over the track and grows with `sound` in [0, 1].
    pub fn moving_circle(&self, index: usize, frame_count: usize, natural_size: u32, sound: f64) -> (f64, f64, f64) {
        let (sx, sy) = (self.scale_x(), self.scale_y());
        let size = natural_size as f64 * (0.5 + sound * 0.5) * sx;
        let progress = if frame_count == 0 {
            0.0
        } else {
            index as f64 / frame_count as f64
        };
        let cx = (114.5 + (1804.5 - 114.5) * progress) * sx;
        let cy = 964.5 * sy;
        (cx - size / 2.0, cy - size / 2.0, size)
    }
}

/// Decoded static inputs, before any layout is applied.
pub struct StaticInputs {
    pub background: Surface,
    pub circle: Surface,
    pub art: Surface,
    pub title: String,
    pub warning: String,
}

/// Emblem drawn at the centre of the circle layout.
pub struct Emblem {
    pub surface: Surface,
    pub x: i32,
    pub y: i32,
}

/// Read-only layers shared by every render worker.
pub struct StaticLayers {
    /// Background scaled to the frame.
    pub background: Surface,
    /// Circle layout: art cut out by the circle image.
    pub emblem: Option<Emblem>,
    /// Classic layout: art placed in its rect on a transparent frame.
    pub art_overlay: Option<Surface>,
    /// Classic layout: circle image at its natural size, resized per frame.
    pub circle: Surface,
    /// Title text on a transparent frame.
    pub title: Surface,
    /// Opaque black frame with the warning text.
    pub warning: Surface,
}

impl StaticLayers {
    pub fn build(inputs: StaticInputs, layout: &Layout, fonts: &FontBook, config: &Config) -> Self {
        let (w, h) = (layout.width, layout.height);
        log::info!("Building static layers ({:?} layout, {}x{})...", layout.variant, w, h);

        let background = inputs.background.scaled(w, h);

        let (emblem, art_overlay) = match layout.variant {
            LayoutVariant::Circle => (Some(build_emblem(&inputs.art, &inputs.circle, layout)), None),
            LayoutVariant::Classic => {
                let mut overlay = Surface::new(w, h);
                let r = layout.art;
                overlay.blend_at(&inputs.art.scaled(r.width, r.height), r.x, r.y, 1.0);
                (None, Some(overlay))
            }
        };

        let mut title = Surface::new(w, h);
        render_title(&mut title, &inputs.title, layout.title, fonts, &config.fonts);

        let warning = render_warning(&inputs.warning, w, h, fonts, &config.fonts);

        Self {
            background,
            emblem,
            art_overlay,
            circle: inputs.circle,
            title,
            warning,
        }
    }
}

fn build_emblem(art: &Surface, circle: &Surface, layout: &Layout) -> Emblem {
    let diameter = ((layout.base_radius() * 2.0).round() as u32).max(1);
    let mut surface = art.scaled(diameter, diameter);
    let mask = circle.scaled(diameter, diameter);
    if let Err(e) = surface.mask_alpha(&mask) {
        log::error!("Emblem mask skipped: {}", e);
    }
    let (cx, cy) = layout.center();
    Emblem {
        surface,
        x: (cx - diameter as f64 / 2.0).round() as i32,
        y: (cy - diameter as f64 / 2.0).round() as i32,
    }
}

fn render_title(surface: &mut Surface, text: &str, rect: Rect, fonts: &FontBook, config: &FontConfig) {
    let Some(font) = fonts.get(&config.title) else {
        return;
    };
    let style = TextStyle {
        font,
        size: config.title_size,
        color: WHITE,
    };
    let lines: Vec<&str> = text.lines().collect();
    draw_centered_block(surface, &style, &lines, TITLE_LINE_SPACING, rect);
}

/// Opaque black frame; first line in the header font, the rest in the content font.
fn render_warning(text: &str, width: u32, height: u32, fonts: &FontBook, config: &FontConfig) -> Surface {
    let mut surface = Surface::filled(width, height, [0, 0, 0, 255]);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let Some((header, content)) = lines.split_first() else {
        return surface;
    };

    let header_style = fonts.get(&config.warning_header).map(|font| TextStyle {
        font,
        size: config.warning_header_size,
        color: WHITE,
    });
    let content_style = fonts.get(&config.warning_content).map(|font| TextStyle {
        font,
        size: config.warning_content_size,
        color: WHITE,
    });

    let header_advance = config.warning_header_size * TITLE_LINE_SPACING;
    let content_advance = config.warning_content_size * TITLE_LINE_SPACING;
    let block = header_advance + content_advance * content.len() as f32;
    let mut top = (height as f32 - block) / 2.0;

    if let Some(style) = &header_style {
        let x = (width as f32 - style.measure_width(header)) / 2.0;
        style.draw_line(&mut surface, header, x, top + style.ascent());
    }
    top += header_advance;
    if let Some(style) = &content_style {
        for line in content {
            let x = (width as f32 - style.measure_width(line)) / 2.0;
            style.draw_line(&mut surface, line, x, top + style.ascent());
            top += content_advance;
        }
    }
    surface
}

/// Debug copy of the warning layer, named after its text file.
pub fn dump_warning(warning: &Surface, warning_text_path: &Path) -> Result<()> {
    let path = warning_text_path.with_extension("png");
    warning.save_png(&path)?;
    log::info!("Wrote epilepsy warning to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> StaticInputs {
        let mut circle = Surface::new(8, 8);
        // Opaque left half only.
        for y in 0..8 {
            for x in 0..4 {
                let i = (y * 8 + x) * 4;
                circle.data_mut()[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
        StaticInputs {
            background: Surface::filled(16, 9, [10, 20, 30, 255]),
            circle,
            art: Surface::filled(8, 8, [200, 0, 0, 255]),
            title: "Song\n\nArtist\n".into(),
            warning: "WARNING\nflashing lights".into(),
        }
    }

    #[test]
    fn full_hd_rects_are_unchanged() {
        let layout = Layout::new(LayoutVariant::Classic, 1920, 1080);
        assert_eq!(layout.waveform, Rect { x: 979, y: 449, width: 917, height: 387 });
        assert_eq!(layout.art, Rect { x: 24, y: 24, width: 917, height: 812 });
    }

    #[test]
    fn rects_scale_with_resolution() {
        let layout = Layout::new(LayoutVariant::Classic, 960, 540);
        assert_eq!(layout.spectrum, Rect { x: 490, y: 12, width: 459, height: 194 });
    }

    #[test]
    fn moving_circle_sweeps_and_grows() {
        let layout = Layout::new(LayoutVariant::Classic, 1920, 1080);
        let (x0, y0, s0) = layout.moving_circle(0, 100, 200, 0.0);
        assert_eq!(s0, 100.0);
        assert_eq!(x0, 114.5 - 50.0);
        assert_eq!(y0, 964.5 - 50.0);
        let (x1, _, s1) = layout.moving_circle(50, 100, 200, 1.0);
        assert_eq!(s1, 200.0);
        assert!((x1 + 100.0 - (114.5 + 845.0)).abs() < 1e-9);
    }

    #[test]
    fn circle_layout_builds_a_masked_centred_emblem() {
        let layout = Layout::new(LayoutVariant::Circle, 16, 9);
        let layers = StaticLayers::build(inputs(), &layout, &FontBook::default(), &Config::default());
        assert_eq!(layers.background.size(), (16, 9));
        assert!(layers.art_overlay.is_none());
        let emblem = layers.emblem.expect("emblem");
        // Diameter = 2 * 9 * 0.25 = 4.5 -> 5 (rounded).
        assert_eq!(emblem.surface.size(), (5, 5));
        assert_eq!(emblem.surface.pixel(0, 2)[3], 255);
        assert_eq!(emblem.surface.pixel(4, 2)[3], 0);
        // Warning is opaque black even without fonts.
        assert_eq!(layers.warning.pixel(3, 3), [0, 0, 0, 255]);
        assert_eq!(layers.title.pixel(3, 3)[3], 0);
    }

    #[test]
    fn classic_layout_places_art_in_its_rect() {
        let layout = Layout::new(LayoutVariant::Classic, 192, 108);
        let layers = StaticLayers::build(inputs(), &layout, &FontBook::default(), &Config::default());
        assert!(layers.emblem.is_none());
        let overlay = layers.art_overlay.expect("art overlay");
        let r = layout.art;
        assert_eq!(overlay.pixel(r.x as u32 + 1, r.y as u32 + 1), [200, 0, 0, 255]);
        assert_eq!(overlay.pixel(191, 107)[3], 0);
    }
}
