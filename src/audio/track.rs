use crate::error::PipelineError;

/// Which of the two sample buffers of a track to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Raw,
    Bass,
}

/// Running (min, max) of a buffer, each end clamped to [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleRange {
    pub min: f32,
    pub max: f32,
}

impl SampleRange {
    pub fn of(samples: &[f32]) -> Self {
        let mut range = SampleRange::default();
        for &s in samples {
            range.observe(s);
        }
        range
    }

    #[inline]
    pub fn observe(&mut self, sample: f32) {
        let s = sample.clamp(-1.0, 1.0);
        self.min = self.min.min(s);
        self.max = self.max.max(s);
    }

    /// Largest magnitude reached, `max(|min|, |max|)`.
    pub fn peak(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }
}

/// A decoded track plus its bass-filtered twin.
///
/// Both buffers are interleaved and have the same length. The bass buffer is
/// silent until [`crate::audio::filter::apply_bass_filter`] runs.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    channels: usize,
    sample_rate: u32,
    frames: usize,
    samples: Vec<f32>,
    bass: Vec<f32>,
    raw_range: SampleRange,
    bass_range: SampleRange,
}

impl AudioTrack {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<Self, PipelineError> {
        if channels == 0 || samples.len() < channels {
            return Err(PipelineError::EmptyTrack);
        }
        if sample_rate == 0 {
            return Err(PipelineError::InvalidTiming("sample rate is zero".into()));
        }
        let frames = samples.len() / channels;
        let mut samples = samples;
        // Drop a trailing partial frame.
        samples.truncate(frames * channels);

        let raw_range = SampleRange::of(&samples);
        let bass = vec![0.0; samples.len()];
        Ok(Self {
            channels,
            sample_rate,
            frames,
            samples,
            bass,
            raw_range,
            bass_range: SampleRange::default(),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    pub fn signal(&self, signal: Signal) -> &[f32] {
        match signal {
            Signal::Raw => &self.samples,
            Signal::Bass => &self.bass,
        }
    }

    pub fn range(&self, signal: Signal) -> SampleRange {
        match signal {
            Signal::Raw => self.raw_range,
            Signal::Bass => self.bass_range,
        }
    }

    pub(super) fn set_bass(&mut self, bass: Vec<f32>, range: SampleRange) {
        debug_assert_eq!(bass.len(), self.samples.len());
        self.bass = bass;
        self.bass_range = range;
    }

    /// Sample of one channel at `frame`, or silence outside the track.
    #[inline]
    pub fn sample(&self, signal: Signal, frame: i64, channel: usize) -> f32 {
        if frame < 0 || frame as usize >= self.frames {
            return 0.0;
        }
        self.signal(signal)[frame as usize * self.channels + channel]
    }

    /// Channel average at `frame`, or silence outside the track.
    #[inline]
    pub fn mono(&self, signal: Signal, frame: i64) -> f32 {
        if frame < 0 || frame as usize >= self.frames {
            return 0.0;
        }
        let start = frame as usize * self.channels;
        let frame_samples = &self.signal(signal)[start..start + self.channels];
        frame_samples.iter().sum::<f32>() / self.channels as f32
    }

    /// RMS over `count` frames starting at `offset`, all channels, normalized
    /// by the buffer's peak magnitude and clamped to [0, 1].
    /// Frames outside the track count as silence. A silent buffer yields 0.
    pub fn intensity(&self, signal: Signal, offset: i64, count: usize) -> f64 {
        let peak = self.range(signal).peak() as f64;
        if count == 0 || peak <= 0.0 {
            return 0.0;
        }
        let buffer = self.signal(signal);
        let start = offset.clamp(0, self.frames as i64) as usize;
        let end = (offset.saturating_add(count as i64)).clamp(0, self.frames as i64) as usize;

        let sum_sq: f64 = buffer[start * self.channels..end * self.channels]
            .iter()
            .map(|&s| {
                let s = s.clamp(-1.0, 1.0) as f64;
                s * s
            })
            .sum();
        let rms = (sum_sq / (count * self.channels) as f64).sqrt();
        (rms / peak).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(AudioTrack::new(vec![], 2, 44100), Err(PipelineError::EmptyTrack)));
        assert!(matches!(AudioTrack::new(vec![0.0; 4], 0, 44100), Err(PipelineError::EmptyTrack)));
        assert!(AudioTrack::new(vec![0.0; 4], 1, 0).is_err());
    }

    #[test]
    fn range_is_clamped_and_starts_at_zero() {
        let track = AudioTrack::new(vec![0.25, 0.5, 3.0, -0.1], 1, 8000).unwrap();
        let r = track.range(Signal::Raw);
        assert_eq!(r.max, 1.0);
        assert_eq!(r.min, -0.1);
        assert_eq!(r.peak(), 1.0);
        assert_eq!(track.range(Signal::Bass), SampleRange::default());
    }

    #[test]
    fn out_of_range_frames_are_silent() {
        let track = AudioTrack::new(vec![0.5, -0.5, 1.0, 0.0], 2, 8000).unwrap();
        assert_eq!(track.frames(), 2);
        assert_eq!(track.mono(Signal::Raw, 0), 0.0);
        assert_eq!(track.mono(Signal::Raw, 1), 0.5);
        assert_eq!(track.mono(Signal::Raw, -1), 0.0);
        assert_eq!(track.sample(Signal::Raw, 2, 0), 0.0);
        assert_eq!(track.sample(Signal::Raw, 1, 0), 1.0);
    }

    #[test]
    fn intensity_of_full_scale_square_is_one() {
        let samples: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.8 } else { -0.8 }).collect();
        let track = AudioTrack::new(samples, 1, 8000).unwrap();
        assert!((track.intensity(Signal::Raw, 0, 100) - 1.0).abs() < 1e-6);
        // Half the window falls before the track start.
        assert!((track.intensity(Signal::Raw, -100, 200) - 0.5f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn silent_track_has_zero_intensity() {
        let track = AudioTrack::new(vec![0.0; 441], 1, 44100).unwrap();
        assert_eq!(track.intensity(Signal::Raw, 0, 441), 0.0);
        assert_eq!(track.intensity(Signal::Bass, 0, 441), 0.0);
    }
}
