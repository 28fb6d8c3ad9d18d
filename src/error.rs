use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop the pipeline before (or right after) the parallel stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing input files: {}", format_paths(.0))]
    MissingInputs(Vec<PathBuf>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("audio track is empty or has no channels")]
    EmptyTrack,

    #[error("invalid frame timing: {0}")]
    InvalidTiming(String),

    #[error("{failed} of {total} frames could not be written")]
    FramesNotWritten { failed: usize, total: usize },

    #[error("render worker {0} panicked")]
    WorkerPanicked(usize),
}

/// A drawing step failed; the compositor drops the affected layer and keeps going.
#[derive(Debug, Error)]
pub enum DrawError {
    #[error("path has fewer than {min} points ({got})")]
    DegeneratePath { min: usize, got: usize },

    #[error("non-finite coordinate in {0}")]
    NonFinite(&'static str),

    #[error("spectrum is empty")]
    EmptySpectrum,

    #[error("layer size {got:?} does not match frame size {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        got: (u32, u32),
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
