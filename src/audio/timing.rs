use serde::Serialize;

use crate::error::PipelineError;

/// How output frames map onto the audio track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameTiming {
    pub frame_count: usize,
    /// Sample frames per output frame; fractional so long tracks stay in sync.
    pub pcm_per_frame: f64,
    /// Samples fed to each FFT before zero padding.
    pub window_size: usize,
    pub fft_size: usize,
}

impl FrameTiming {
    pub fn new(
        total_frames: usize,
        sample_rate: u32,
        fps: f64,
        input_size_multiplier: f64,
    ) -> Result<Self, PipelineError> {
        if total_frames == 0 {
            return Err(PipelineError::EmptyTrack);
        }
        if sample_rate == 0 {
            return Err(PipelineError::InvalidTiming("sample rate is zero".into()));
        }
        if !(fps > 0.0) || !fps.is_finite() {
            return Err(PipelineError::InvalidTiming(format!("fps {fps}")));
        }
        if !(input_size_multiplier > 0.0) {
            return Err(PipelineError::InvalidTiming(format!(
                "input size multiplier {input_size_multiplier}"
            )));
        }

        let duration = total_frames as f64 / sample_rate as f64;
        let frame_count = (duration * fps).ceil() as usize;
        let pcm_per_frame = total_frames as f64 / frame_count as f64;
        let window_size = ((pcm_per_frame * input_size_multiplier) as usize).max(1);
        // Bin 1 must exist even for a one-sample window.
        let fft_size = window_size.next_power_of_two().max(2);

        log::debug!(
            "Timing: {} frames, {:.3} pcm/frame, window {}, fft {}",
            frame_count,
            pcm_per_frame,
            window_size,
            fft_size
        );

        Ok(Self {
            frame_count,
            pcm_per_frame,
            window_size,
            fft_size,
        })
    }

    /// First sample frame of output frame `index`'s analysis window,
    /// centred on the frame start and never past the end of the track.
    pub fn window_offset(&self, index: usize, total_frames: usize) -> i64 {
        let start = (index as f64 * self.pcm_per_frame).floor() as i64;
        (start - (self.window_size / 2) as i64).min(total_frames as i64)
    }
}
