use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, LayoutVariant};

#[derive(Parser, Debug)]
#[command(name = "sonoframe", about = "Renders an audio track into a numbered PNG frame sequence")]
pub struct Cli {
    /// Project directory containing audio.wav, art.png and title.txt
    pub project: PathBuf,

    /// Directory with bg.png, circle.png and epileptic_warning.txt (default: project parent)
    #[arg(long)]
    pub common: Option<PathBuf>,

    /// Font directory (default: <common>/__fonts)
    #[arg(long)]
    pub fonts: Option<PathBuf>,

    /// Config file (default: sonoframe.toml, then the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Frame layout
    #[arg(short, long, value_enum)]
    pub layout: Option<LayoutVariant>,

    /// Frame width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<f64>,

    /// Render worker count (default: available parallelism)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Seed for particles and shake, for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the bass-filtered audio next to the project
    #[arg(long)]
    pub dump_filtered: bool,

    /// Write the rendered epilepsy warning next to its text file
    #[arg(long)]
    pub dump_warning: bool,
}

impl Cli {
    /// Flags given on the command line win over file values.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(layout) = self.layout {
            config.layout.variant = layout;
        }
        if let Some(width) = self.width {
            config.output.width = width;
        }
        if let Some(height) = self.height {
            config.output.height = height;
        }
        if let Some(fps) = self.fps {
            config.output.fps = fps;
        }
        if self.threads.is_some() {
            config.output.threads = self.threads;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.filter.dump_filtered |= self.dump_filtered;
        config.warning.dump |= self.dump_warning;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_values() {
        let cli = Cli::parse_from([
            "sonoframe", "proj", "--layout", "classic", "--fps", "30", "-j", "2", "--dump-warning",
        ]);
        let mut config = Config::default();
        config.output.width = 1280;
        config.seed = Some(5);
        cli.apply_overrides(&mut config);

        assert_eq!(cli.project, PathBuf::from("proj"));
        assert_eq!(config.layout.variant, LayoutVariant::Classic);
        assert_eq!(config.output.fps, 30.0);
        assert_eq!(config.output.threads, Some(2));
        assert_eq!(config.output.width, 1280);
        assert_eq!(config.seed, Some(5));
        assert!(config.warning.dump);
        assert!(!config.filter.dump_filtered);
    }
}
