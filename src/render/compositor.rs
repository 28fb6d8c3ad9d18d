//! Per-frame composition: dynamic layers over the static ones, channel shake,
//! warning overlay, PNG write.

use anyhow::Result;
use rand::Rng;
use std::f64::consts::PI;
use std::path::PathBuf;

use crate::audio::features::{DbWindow, SpectralFrame};
use crate::audio::track::{AudioTrack, Signal};
use crate::config::{Config, LayoutVariant};
use crate::error::DrawError;
use crate::particles::ParticleState;

use super::draw::{radial_gradient_disc, Mask, Point};
use super::layers::{Layout, StaticLayers};
use super::surface::{ChannelOffsets, Surface};

const RING_SCALES: [f64; 5] = [0.6, 0.7, 0.8, 0.9, 1.0];
const RING_COLORS: [[f32; 3]; 5] = [
    [0.0, 0.0, 0.5],
    [0.0, 0.0, 0.625],
    [0.0, 1.0 / 3.0, 0.75],
    [0.0, 2.0 / 3.0, 0.875],
    [0.0, 1.0, 1.0],
];
const HALO_COLOR: [f32; 4] = [0.55, 0.75, 1.0, 0.6];
const STROKE_WIDTH: f64 = 3.0;
const SPECTRUM_COLOR: [f32; 4] = [0.5, 0.0, 0.0, 1.0];

/// Everything a frame needs, borrowed from one render task.
pub struct FrameTask<'a> {
    pub index: usize,
    pub pcm_offset: i64,
    pub pcm_count: usize,
    pub spectrum: &'a SpectralFrame,
    pub particles: &'a [ParticleState],
    pub path: PathBuf,
}

/// Read-only state shared by every worker.
pub struct FrameContext<'a> {
    pub track: &'a AudioTrack,
    pub layers: &'a StaticLayers,
    pub layout: &'a Layout,
    pub window: DbWindow,
    pub config: &'a Config,
    pub frame_count: usize,
}

/// Transient surfaces reused across one worker's frames.
pub struct FrameScratch {
    composite: Surface,
    layer: Surface,
    shaken: Surface,
    frame: Surface,
    mask: Mask,
    panel: Surface,
    panel_mask: Mask,
}

impl FrameScratch {
    pub fn new(layout: &Layout) -> Self {
        let (w, h) = (layout.width, layout.height);
        let (pw, ph) = match layout.variant {
            LayoutVariant::Classic => (layout.waveform.width, layout.waveform.height),
            LayoutVariant::Circle => (1, 1),
        };
        Self {
            composite: Surface::new(w, h),
            layer: Surface::new(w, h),
            shaken: Surface::new(w, h),
            frame: Surface::new(w, h),
            mask: Mask::new(w, h),
            panel: Surface::new(pw, ph),
            panel_mask: Mask::new(pw, ph),
        }
    }

    pub fn frame(&self) -> &Surface {
        &self.frame
    }
}

/// Opacity of the epilepsy warning on frame `index`.
pub fn warning_alpha(index: usize, fps: f64, visible: f64, fadeout: f64) -> f32 {
    if index < (visible * fps) as usize {
        return 1.0;
    }
    if index >= ((visible + fadeout) * fps) as usize || fadeout <= 0.0 {
        return 0.0;
    }
    let t = index as f64 / fps;
    (1.0 - (t - visible) / fadeout).clamp(0.0, 1.0) as f32
}

/// Compose frame `task` into `scratch.frame()`.
pub fn compose<R: Rng>(ctx: &FrameContext, task: &FrameTask, scratch: &mut FrameScratch, rng: &mut R) {
    let layout = ctx.layout;
    let bass = ctx.track.intensity(Signal::Bass, task.pcm_offset, task.pcm_count);
    let sound = ctx.track.intensity(Signal::Raw, task.pcm_offset, task.pcm_count);
    log::trace!("Frame {}: bass {:.3}, sound {:.3}", task.index, bass, sound);

    let shake = &ctx.config.shake;
    let max_offset = shake.max_offset * shake.intensity_scale * bass * layout.scale_x();

    if let Err(e) = scratch.composite.copy_from(&ctx.layers.background) {
        log::error!("Frame {}: background skipped: {}", task.index, e);
        scratch.composite.fill([0, 0, 0, 255]);
    }

    match layout.variant {
        LayoutVariant::Circle => compose_circle(ctx, task, scratch),
        LayoutVariant::Classic => compose_classic(ctx, task, scratch, sound),
    }

    scratch.frame.fill([0, 0, 0, 255]);
    let offsets = ChannelOffsets::random(rng, max_offset, shake.red_only);
    shake_onto_frame(&scratch.composite, &offsets, &mut scratch.shaken, &mut scratch.frame, task.index);

    if layout.variant == LayoutVariant::Classic {
        // Art and title each get their own channel offsets.
        if let Some(art) = &ctx.layers.art_overlay {
            let offsets = ChannelOffsets::random(rng, max_offset, false);
            shake_onto_frame(art, &offsets, &mut scratch.shaken, &mut scratch.frame, task.index);
        }
        let offsets = ChannelOffsets::random(rng, max_offset, false);
        shake_onto_frame(&ctx.layers.title, &offsets, &mut scratch.shaken, &mut scratch.frame, task.index);
    }

    let fps = ctx.config.output.fps;
    let warning = &ctx.config.warning;
    let alpha = warning_alpha(task.index, fps, warning.visible_seconds, warning.fadeout_seconds);
    if alpha > 0.0 {
        guard(task.index, "warning", scratch.frame.blend(&ctx.layers.warning, alpha));
    }
}

/// Compose and write one frame.
pub fn render_frame<R: Rng>(ctx: &FrameContext, task: &FrameTask, scratch: &mut FrameScratch, rng: &mut R) -> Result<()> {
    compose(ctx, task, scratch, rng);
    scratch.frame.save_png(&task.path)
}

fn compose_circle(ctx: &FrameContext, task: &FrameTask, scratch: &mut FrameScratch) {
    let index = task.index;

    scratch.layer.clear();
    if guard(index, "particles", draw_particles(&mut scratch.layer, task.particles)) {
        guard(index, "particles", scratch.composite.blend(&scratch.layer, 1.0));
    }

    scratch.layer.clear();
    let plot = draw_spectrum_plot(&mut scratch.mask, &mut scratch.layer, task.spectrum, &ctx.window, ctx.layout);
    if guard(index, "spectrum plot", plot) {
        guard(index, "spectrum plot", scratch.composite.blend(&scratch.layer, 1.0));
    }

    if let Some(emblem) = &ctx.layers.emblem {
        scratch.composite.blend_at(&emblem.surface, emblem.x, emblem.y, 1.0);
    }
    guard(index, "title", scratch.composite.blend(&ctx.layers.title, 1.0));
}

fn compose_classic(ctx: &FrameContext, task: &FrameTask, scratch: &mut FrameScratch, sound: f64) {
    let (index, layout) = (task.index, ctx.layout);

    scratch.panel.fill([0, 0, 0, 255]);
    let waves = draw_waveform(&mut scratch.panel_mask, &mut scratch.panel, ctx.track, task);
    if guard(index, "waveform", waves) {
        let r = layout.waveform;
        scratch.composite.blend_at(&scratch.panel, r.x, r.y, 1.0);
    }

    scratch.panel.fill([0, 0, 0, 255]);
    let freqs = draw_spectrum_panel(&mut scratch.panel_mask, &mut scratch.panel, task.spectrum, &ctx.window);
    if guard(index, "spectrum panel", freqs) {
        let r = layout.spectrum;
        scratch.composite.blend_at(&scratch.panel, r.x, r.y, 1.0);
    }

    let circle = &ctx.layers.circle;
    let (x, y, size) = layout.moving_circle(index, ctx.frame_count, circle.width(), sound);
    let side = size.round().max(1.0) as u32;
    scratch
        .composite
        .blend_at(&circle.scaled(side, side), x.round() as i32, y.round() as i32, 1.0);
}

fn shake_onto_frame(src: &Surface, offsets: &ChannelOffsets, shaken: &mut Surface, frame: &mut Surface, index: usize) {
    if guard(index, "shake", src.shake_into(offsets, shaken)) {
        guard(index, "shake", frame.blend(shaken, 1.0));
    }
}

/// Log a failed drawing step; `true` when it succeeded.
fn guard(index: usize, layer: &str, result: Result<(), DrawError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("Frame {}: {} layer skipped: {}", index, layer, e);
            false
        }
    }
}

fn draw_particles(layer: &mut Surface, particles: &[ParticleState]) -> Result<(), DrawError> {
    for p in particles {
        radial_gradient_disc(layer, (p.x as f64, p.y as f64), p.radius as f64, HALO_COLOR)?;
    }
    Ok(())
}

/// Radial shape of the ring: bulges in the low mids, flattens at both ends.
fn ring_envelope(x: f64) -> f64 {
    let x2 = x * x;
    -16.0 / 3.0 * x2 * x2 + 40.0 / 3.0 * x2 * x - 41.0 / 3.0 * x2 + 17.0 / 3.0 * x + 0.25
}

/// Closed outline of one ring: down the right side from the top, back up
/// the left side mirrored.
fn ring_outline(spectrum: &SpectralFrame, window: &DbWindow, layout: &Layout, scale: f64) -> Vec<Point> {
    let (cx, cy) = layout.center();
    let base = layout.base_radius();
    let range = layout.max_radius() - base;
    let (min_freq, max_freq) = (spectrum.grid.min_freq(), spectrum.grid.max_freq());
    let span = (max_freq - min_freq).max(f64::EPSILON);

    let right: Vec<Point> = spectrum
        .pairs()
        .map(|(freq, db)| {
            let norm_freq = (freq - min_freq) / span;
            let theta = norm_freq * PI;
            let r = base + range * ring_envelope(norm_freq) * window.normalize(db) * scale;
            (cx + theta.sin() * r, cy - theta.cos() * r)
        })
        .collect();
    let left = right.iter().rev().map(|&(x, y)| (2.0 * cx - x, y));
    right.iter().copied().chain(left).collect()
}

fn draw_spectrum_plot(
    mask: &mut Mask,
    layer: &mut Surface,
    spectrum: &SpectralFrame,
    window: &DbWindow,
    layout: &Layout,
) -> Result<(), DrawError> {
    if spectrum.is_empty() {
        return Err(DrawError::EmptySpectrum);
    }
    let rings: Vec<Vec<Point>> = RING_SCALES
        .iter()
        .map(|&scale| ring_outline(spectrum, window, layout, scale))
        .collect();
    let n = rings.len();

    // Outermost ring first so inner fills darken on top.
    for (i, ring) in rings.iter().enumerate().rev() {
        mask.clear();
        mask.fill_polygon(ring)?;
        let alpha = 0.6 - (n - i) as f32 * 0.1;
        mask.paint(layer, [0.0, 0.0, 0.0, alpha])?;
    }

    let width = (STROKE_WIDTH * layout.scale_y()).max(1.0);
    for (ring, color) in rings.iter().zip(RING_COLORS) {
        mask.clear();
        mask.stroke_polyline(ring, width, true)?;
        mask.paint(layer, [color[0], color[1], color[2], 1.0])?;
    }
    Ok(())
}

/// One polyline per channel across the panel, last channel first.
fn draw_waveform(mask: &mut Mask, panel: &mut Surface, track: &AudioTrack, task: &FrameTask) -> Result<(), DrawError> {
    let (w, h) = (panel.width() as f64, panel.height() as f64);
    let mid = h / 2.0;
    let count = task.pcm_count;
    let step = if count > 1 { w / (count - 1) as f64 } else { 0.0 };

    for channel in (0..track.channels()).rev() {
        let points: Vec<Point> = (0..count)
            .map(|i| {
                let sample = track.sample(Signal::Raw, task.pcm_offset + i as i64, channel) as f64;
                ((step * i as f64).round(), (mid + mid * sample).round())
            })
            .collect();
        mask.clear();
        mask.stroke_polyline(&points, STROKE_WIDTH, false)?;
        let red = 0.5f32.powi(channel as i32);
        mask.paint(panel, [red, 0.0, 0.0, 1.0])?;
    }
    Ok(())
}

/// Filled spectrum curve with a logarithmic frequency axis.
fn draw_spectrum_panel(
    mask: &mut Mask,
    panel: &mut Surface,
    spectrum: &SpectralFrame,
    window: &DbWindow,
) -> Result<(), DrawError> {
    if spectrum.is_empty() {
        return Err(DrawError::EmptySpectrum);
    }
    let (w, h) = (panel.width() as f64, panel.height() as f64);
    let log_min = spectrum.grid.min_freq().ln();
    let log_span = (spectrum.grid.max_freq().ln() - log_min).max(f64::EPSILON);

    let mut points: Vec<Point> = Vec::with_capacity(spectrum.grid.len() + 2);
    points.push((0.0, h));
    points.extend(spectrum.pairs().map(|(freq, db)| {
        let x = (freq.ln() - log_min) / log_span * w;
        (x, h * (1.0 - window.normalize(db)))
    }));
    points.push((w, h));

    mask.clear();
    mask.fill_polygon(&points)?;
    mask.paint(panel, SPECTRUM_COLOR)
}
