//! Vector parts of a frame: filled polygons, thick polylines and radial
//! gradient discs, rasterized with imageproc into a coverage mask and then
//! painted onto a [`Surface`].

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_antialiased_line_segment_mut, draw_filled_circle_mut, draw_polygon_mut};
use imageproc::pixelops::interpolate;
use imageproc::point::Point as Vertex;

use crate::error::DrawError;

use super::surface::Surface;

/// Upper bound on the concentric steps of a gradient disc.
const GRADIENT_STEPS: usize = 32;

const FULL: Luma<u8> = Luma([255]);

pub type Point = (f64, f64);

/// Per-pixel coverage, 0 (empty) to 255 (covered).
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn clear(&mut self) {
        let data: &mut [u8] = &mut self.image;
        data.fill(0);
    }

    #[cfg(test)]
    pub fn coverage(&self, x: u32, y: u32) -> f32 {
        self.image.get_pixel(x, y)[0] as f32 / 255.0
    }

    /// Even-odd fill of the closed polygon through `points`, with
    /// anti-aliased edges.
    pub fn fill_polygon(&mut self, points: &[Point]) -> Result<(), DrawError> {
        check_points(points, 3, "polygon")?;
        self.fill_vertices(&to_vertices(points));
        Ok(())
    }

    fn fill_vertices(&mut self, vertices: &[Vertex<i32>]) {
        // draw_polygon_mut needs three distinct corners and an open outline.
        if vertices.len() >= 3 {
            draw_polygon_mut(&mut self.image, vertices, FULL);
        }
        for (i, a) in vertices.iter().enumerate() {
            let b = vertices[(i + 1) % vertices.len()];
            draw_antialiased_line_segment_mut(&mut self.image, (a.x, a.y), (b.x, b.y), FULL, interpolate);
        }
    }

    /// Stroke of `width` pixels along the polyline with round joins and caps.
    pub fn stroke_polyline(&mut self, points: &[Point], width: f64, closed: bool) -> Result<(), DrawError> {
        check_points(points, 2, "polyline")?;
        let segments = if closed { points.len() } else { points.len() - 1 };
        let half = width * 0.5;

        if half <= 0.75 {
            for i in 0..segments {
                let (a, b) = (vertex(points[i]), vertex(points[(i + 1) % points.len()]));
                draw_antialiased_line_segment_mut(&mut self.image, (a.x, a.y), (b.x, b.y), FULL, interpolate);
            }
            return Ok(());
        }

        let join_radius = half.round() as i32;
        for i in 0..segments {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            let (dx, dy) = (b.0 - a.0, b.1 - a.1);
            let len = (dx * dx + dy * dy).sqrt();
            if len > 0.0 {
                let (nx, ny) = (-dy / len * half, dx / len * half);
                let quad = [
                    (a.0 + nx, a.1 + ny),
                    (b.0 + nx, b.1 + ny),
                    (b.0 - nx, b.1 - ny),
                    (a.0 - nx, a.1 - ny),
                ];
                self.fill_vertices(&to_vertices(&quad));
            }
            let joint = vertex(a);
            draw_filled_circle_mut(&mut self.image, (joint.x, joint.y), join_radius, FULL);
        }
        if !closed {
            let end = vertex(points[points.len() - 1]);
            draw_filled_circle_mut(&mut self.image, (end.x, end.y), join_radius, FULL);
        }
        Ok(())
    }

    /// Composite a straight-alpha colour through the mask onto `surface`.
    pub fn paint(&self, surface: &mut Surface, rgba: [f32; 4]) -> Result<(), DrawError> {
        if surface.size() != self.size() {
            return Err(DrawError::SizeMismatch {
                expected: surface.size(),
                got: self.size(),
            });
        }
        self.paint_at(surface, 0, 0, rgba);
        Ok(())
    }

    /// Like [`Mask::paint`] with the mask's top-left corner at (`x`, `y`), clipped.
    pub fn paint_at(&self, surface: &mut Surface, x: i32, y: i32, rgba: [f32; 4]) {
        let a = rgba[3].clamp(0.0, 1.0);
        let premul = [rgba[0] * a * 255.0, rgba[1] * a * 255.0, rgba[2] * a * 255.0, a * 255.0];
        let (sw, sh) = (surface.width() as i32, surface.height() as i32);
        let (mw, mh) = (self.image.width() as i32, self.image.height() as i32);
        let (x0, y0) = (x.max(0), y.max(0));
        let (x1, y1) = ((x + mw).min(sw), (y + mh).min(sh));
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let data = surface.data_mut();
        for py in y0..y1 {
            for px in x0..x1 {
                let cov = self.image.get_pixel((px - x) as u32, (py - y) as u32)[0];
                if cov == 0 {
                    continue;
                }
                let cov = cov as f32 / 255.0;
                let i = ((py * sw + px) * 4) as usize;
                let inv = 1.0 - a * cov;
                for c in 0..4 {
                    data[i + c] = (premul[c] * cov + data[i + c] as f32 * inv).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

fn vertex(p: Point) -> Vertex<i32> {
    Vertex::new(p.0.round() as i32, p.1.round() as i32)
}

/// Pixel vertices with consecutive repeats and a closing repeat removed.
fn to_vertices(points: &[Point]) -> Vec<Vertex<i32>> {
    let mut out: Vec<Vertex<i32>> = Vec::with_capacity(points.len());
    for &p in points {
        let v = vertex(p);
        if out.last() != Some(&v) {
            out.push(v);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn check_points(points: &[Point], min: usize, what: &'static str) -> Result<(), DrawError> {
    if points.len() < min {
        return Err(DrawError::DegeneratePath {
            min,
            got: points.len(),
        });
    }
    if points.iter().any(|p| !p.0.is_finite() || !p.1.is_finite()) {
        return Err(DrawError::NonFinite(what));
    }
    Ok(())
}

/// Disc with a radial alpha ramp: `rgba` at the centre, transparent at `radius`.
///
/// Built from concentric filled circles, each one step more opaque than the
/// ring around it.
pub fn radial_gradient_disc(
    surface: &mut Surface,
    center: Point,
    radius: f64,
    rgba: [f32; 4],
) -> Result<(), DrawError> {
    if !(center.0.is_finite() && center.1.is_finite() && radius.is_finite()) {
        return Err(DrawError::NonFinite("gradient disc"));
    }
    if radius <= 0.0 {
        return Ok(());
    }
    let reach = radius.ceil() as i32 + 1;
    let (cx, cy) = (center.0.floor() as i32, center.1.floor() as i32);
    let (ox, oy) = (cx - reach, cy - reach);
    let side = (2 * reach + 1) as u32;

    let mut mask = Mask::new(side, side);
    let steps = (radius.ceil() as usize).clamp(1, GRADIENT_STEPS);
    for k in 0..steps {
        let r = radius * (1.0 - k as f64 / steps as f64);
        let level = ((k as f64 + 0.5) / steps as f64 * 255.0).round() as u8;
        draw_filled_circle_mut(&mut mask.image, (reach, reach), r.round() as i32, Luma([level]));
    }
    mask.paint_at(surface, ox, oy, rgba);
    Ok(())
}
