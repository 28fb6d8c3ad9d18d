//! End-to-end run: resolve inputs, prepare every shared stage sequentially,
//! then hand the frames to the worker pool.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::analysis::{self, SpectralAnalysis};
use crate::audio::decode::decode_audio;
use crate::audio::features::DbWindow;
use crate::audio::filter::{apply_bass_filter, dump_filtered, filtered_dump_path};
use crate::audio::timing::FrameTiming;
use crate::audio::track::AudioTrack;
use crate::config::{Config, LayoutVariant};
use crate::error::PipelineError;
use crate::particles::{ParticleField, ParticleSnapshot};
use crate::render::compositor::{FrameContext, FrameTask};
use crate::render::layers::{dump_warning, Layout, StaticInputs, StaticLayers};
use crate::render::scheduler;
use crate::render::surface::{load_png_with_retry, Surface};
use crate::render::text::FontBook;

const LOAD_ATTEMPTS: u32 = 3;
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Every file the pipeline reads or writes.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project: PathBuf,
    pub common: PathBuf,
    pub fonts: PathBuf,
    pub audio: PathBuf,
    pub art: PathBuf,
    pub title: PathBuf,
    pub background: PathBuf,
    pub circle: PathBuf,
    pub warning: PathBuf,
    pub pictures: PathBuf,
    pub summary: PathBuf,
}

impl ProjectPaths {
    /// Common assets default to the project's parent, fonts to `<common>/__fonts`.
    pub fn resolve(project: &Path, common: Option<&Path>, fonts: Option<&Path>) -> Self {
        let common = common.map(Path::to_path_buf).unwrap_or_else(|| project.join(".."));
        let fonts = fonts.map(Path::to_path_buf).unwrap_or_else(|| common.join("__fonts"));
        Self {
            audio: project.join("audio.wav"),
            art: project.join("art.png"),
            title: project.join("title.txt"),
            background: common.join("bg.png"),
            circle: common.join("circle.png"),
            warning: common.join("epileptic_warning.txt"),
            pictures: project.join("__pictures"),
            summary: project.join("__render.json"),
            project: project.to_path_buf(),
            common,
            fonts,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let missing: Vec<PathBuf> = [
            &self.audio,
            &self.art,
            &self.title,
            &self.background,
            &self.circle,
            &self.warning,
        ]
        .into_iter()
        .filter(|p| !p.is_file())
        .cloned()
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::MissingInputs(missing))
        }
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.pictures.join(format!("{index}.png"))
    }
}

/// Written next to the frames for whatever assembles them into a video.
#[derive(Debug, Clone, Serialize)]
pub struct RenderSummary {
    pub frame_count: usize,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration_secs: f64,
    pub pcm_per_frame: f64,
    pub window_size: usize,
    pub fft_size: usize,
    pub db_window: DbWindow,
    pub layout: LayoutVariant,
}

/// Shared, read-only state for the parallel stage.
pub struct PipelineContext {
    pub paths: ProjectPaths,
    pub config: Config,
    pub track: AudioTrack,
    pub timing: FrameTiming,
    pub analysis: SpectralAnalysis,
    pub particles: Vec<ParticleSnapshot>,
    pub layout: Layout,
    pub layers: StaticLayers,
}

impl PipelineContext {
    /// Run every sequential stage. Nothing is spawned yet.
    pub fn prepare(paths: ProjectPaths, config: Config) -> Result<Self> {
        config.validate().inspect_err(|e| log::error!("{}", e))?;
        paths.validate().inspect_err(|e| log::error!("{}", e))?;

        log::info!("Decoding {}...", paths.audio.display());
        let mut track = decode_audio(&paths.audio).inspect_err(|e| log::error!("{:#}", e))?;

        log::info!("Filtering bass...");
        apply_bass_filter(&mut track, &config.filter);
        if config.filter.dump_filtered {
            dump_filtered(&track, &filtered_dump_path(&paths.project, &config.filter))?;
        }

        let timing = FrameTiming::new(
            track.frames(),
            track.sample_rate(),
            config.output.fps,
            config.spectrum.input_size_multiplier,
        )
        .inspect_err(|e| log::error!("{}", e))?;
        log::info!(
            "Total frames: {} ({:.3} samples/frame, FFT {})",
            timing.frame_count,
            timing.pcm_per_frame,
            timing.fft_size
        );

        let analysis = analysis::analyze(&track, &timing, &config.spectrum);
        let layout = Layout::new(config.layout.variant, config.output.width, config.output.height);
        let particles = simulate_particles(&config, &layout, &analysis);
        let layers = build_layers(&paths, &config, &layout)?;

        Ok(Self {
            paths,
            config,
            track,
            timing,
            analysis,
            particles,
            layout,
            layers,
        })
    }

    /// Clear `__pictures`, render every frame into it, write the summary.
    pub fn render(&self) -> Result<RenderSummary> {
        prepare_output_dir(&self.paths.pictures)?;

        let total = self.track.frames();
        let tasks: Vec<FrameTask> = (0..self.timing.frame_count)
            .map(|index| FrameTask {
                index,
                pcm_offset: self.timing.window_offset(index, total),
                pcm_count: self.timing.window_size,
                spectrum: &self.analysis.frames[index],
                particles: self.particles.get(index).map(Vec::as_slice).unwrap_or(&[]),
                path: self.paths.frame_path(index),
            })
            .collect();

        let ctx = FrameContext {
            track: &self.track,
            layers: &self.layers,
            layout: &self.layout,
            window: self.analysis.window,
            config: &self.config,
            frame_count: self.timing.frame_count,
        };
        let workers = scheduler::worker_count(self.config.output.threads);
        scheduler::run(&ctx, tasks, workers, self.config.seed)?;

        let summary = self.summary();
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&self.paths.summary, json)
            .with_context(|| format!("Failed to write {}", self.paths.summary.display()))?;
        log::info!(
            "Wrote {} frames to {}",
            summary.frame_count,
            self.paths.pictures.display()
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RenderSummary {
        RenderSummary {
            frame_count: self.timing.frame_count,
            fps: self.config.output.fps,
            width: self.layout.width,
            height: self.layout.height,
            sample_rate: self.track.sample_rate(),
            channels: self.track.channels(),
            duration_secs: self.track.duration_secs(),
            pcm_per_frame: self.timing.pcm_per_frame,
            window_size: self.timing.window_size,
            fft_size: self.timing.fft_size,
            db_window: self.analysis.window,
            layout: self.layout.variant,
        }
    }
}

/// Prepare and render in one go.
pub fn run(paths: ProjectPaths, config: Config) -> Result<RenderSummary> {
    PipelineContext::prepare(paths, config)?.render()
}

/// Particle snapshots for the circle layout; the classic layout has none.
fn simulate_particles(config: &Config, layout: &Layout, analysis: &SpectralAnalysis) -> Vec<ParticleSnapshot> {
    if layout.variant != LayoutVariant::Circle || config.particles.count == 0 {
        return Vec::new();
    }
    log::info!("Simulating {} particles...", config.particles.count);
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut field = ParticleField::new(
        &config.particles,
        layout.width,
        layout.height,
        config.output.fps,
        config.spectrum.alpha,
        (analysis.grid.min_freq(), analysis.grid.max_freq()),
        &mut rng,
    );
    field.simulate(&analysis.frames, &analysis.window)
}

fn build_layers(paths: &ProjectPaths, config: &Config, layout: &Layout) -> Result<StaticLayers> {
    let load = |path: &Path| -> Result<Surface> { load_png_with_retry(path, LOAD_ATTEMPTS, LOAD_RETRY_DELAY) };
    let read = |path: &Path| -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    };

    let inputs = StaticInputs {
        background: load(&paths.background)?,
        circle: load(&paths.circle)?,
        art: load(&paths.art)?,
        title: read(&paths.title)?,
        warning: read(&paths.warning)?,
    };
    let fonts = FontBook::load_dir(&paths.fonts);
    let layers = StaticLayers::build(inputs, layout, &fonts, config);
    if config.warning.dump {
        dump_warning(&layers.warning, &paths.warning)?;
    }
    Ok(layers)
}

fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).with_context(|| format!("Failed to clear {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sonoframe-{}-{}", name, std::process::id()));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_silence(path: &Path, sample_rate: u32, seconds: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..sample_rate * seconds {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// `<root>/common` with shared assets and `<root>/common/song` as the project.
    fn project(root: &Path) -> ProjectPaths {
        let common = root.join("common");
        let song = common.join("song");
        std::fs::create_dir_all(&song).unwrap();
        Surface::filled(8, 8, [20, 30, 40, 255]).save_png(&common.join("bg.png")).unwrap();
        Surface::filled(8, 8, [255, 255, 255, 255]).save_png(&common.join("circle.png")).unwrap();
        std::fs::write(common.join("epileptic_warning.txt"), "WARNING\nflashing lights\n").unwrap();
        Surface::filled(8, 8, [200, 10, 10, 255]).save_png(&song.join("art.png")).unwrap();
        std::fs::write(song.join("title.txt"), "Artist\nSong\n").unwrap();
        write_silence(&song.join("audio.wav"), 8000, 1);
        ProjectPaths::resolve(&song, None, None)
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.output.width = 64;
        config.output.height = 36;
        config.output.threads = Some(3);
        config.seed = Some(11);
        config.particles.count = 0;
        config.warning.visible_seconds = 0.0;
        config.warning.fadeout_seconds = 0.0;
        config
    }

    #[test]
    fn resolve_defaults_to_parent_and_font_subdir() {
        let paths = ProjectPaths::resolve(Path::new("/p/song"), None, None);
        assert_eq!(paths.common, Path::new("/p/song/.."));
        assert_eq!(paths.fonts, Path::new("/p/song/../__fonts"));
        assert_eq!(paths.background, Path::new("/p/song/../bg.png"));
        assert_eq!(paths.frame_path(12), Path::new("/p/song/__pictures/12.png"));
    }

    #[test]
    fn missing_inputs_are_reported_together() {
        let root = scratch_dir("missing");
        let paths = ProjectPaths::resolve(&root, Some(&root), None);
        std::fs::write(&paths.title, "x").unwrap();
        match paths.validate() {
            Err(PipelineError::MissingInputs(missing)) => {
                assert_eq!(missing.len(), 5);
                assert!(!missing.contains(&paths.title));
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = run(paths, small_config()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInputs(_))
        ));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn silent_second_renders_sixty_identical_frames() {
        let root = scratch_dir("silent");
        let paths = project(&root);
        std::fs::create_dir_all(&paths.pictures).unwrap();
        std::fs::write(paths.pictures.join("stale.png"), b"old").unwrap();

        let summary = run(paths.clone(), small_config()).unwrap();
        assert_eq!(summary.frame_count, 60);
        assert_eq!(summary.window_size, 800);
        assert_eq!(summary.fft_size, 1024);

        assert!(!paths.pictures.join("stale.png").exists());
        let first = std::fs::read(paths.frame_path(0)).unwrap();
        for i in 0..60 {
            let frame = std::fs::read(paths.frame_path(i)).unwrap();
            assert_eq!(frame, first, "frame {i} differs");
        }
        assert!(!paths.frame_path(60).exists());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary).unwrap()).unwrap();
        assert_eq!(json["frame_count"], 60);
        assert_eq!(json["layout"], "circle");
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn seeded_particles_render_reproducibly() {
        let root = scratch_dir("particles");
        let paths = project(&root);
        let mut config = small_config();
        config.particles.count = 16;
        // Radii scale with width / 1920: about 7 to 13 px here.
        config.particles.min_radius = 200.0;
        config.particles.max_radius = 400.0;
        // Silence keeps every particle at the slow speed: 40 px/s here.
        config.particles.slow_speed = 1200.0;

        let frames = |config: Config| -> Vec<Vec<u8>> {
            run(paths.clone(), config).unwrap();
            [0, 30, 59]
                .iter()
                .map(|&i| std::fs::read(paths.frame_path(i)).unwrap())
                .collect()
        };
        let first = frames(config.clone());
        let second = frames(config.clone());
        assert_eq!(first, second);

        config.particles.count = 0;
        let bare = frames(config);
        assert_ne!(first[0], bare[0]);
        // Particles drift, so the field changes over time.
        assert_ne!(first[0], first[2]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn classic_layout_and_debug_dumps() {
        let root = scratch_dir("classic");
        let paths = project(&root);
        let mut config = small_config();
        config.layout.variant = LayoutVariant::Classic;
        config.filter.dump_filtered = true;
        config.warning.dump = true;

        let summary = run(paths.clone(), config.clone()).unwrap();
        assert_eq!(summary.layout, LayoutVariant::Classic);
        assert!(paths.frame_path(59).exists());
        assert!(filtered_dump_path(&paths.project, &config.filter).exists());
        assert!(paths.common.join("epileptic_warning.png").exists());
        std::fs::remove_dir_all(&root).ok();
    }
}
