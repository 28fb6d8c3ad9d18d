use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::track::AudioTrack;

/// Decode every packet of the first audio stream in `path` into a track.
///
/// Channels stay interleaved; undecodable packets are logged and skipped.
pub fn decode_audio(path: &Path) -> Result<AudioTrack> {
    let (mut format, track_id, params) = open_stream(path)?;
    let sample_rate = params.sample_rate.context("Unknown sample rate")?;
    let mut channels = params.channels.map_or(0, |c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut samples: Vec<f32> = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let block = match decoder.decode(&packet) {
            Ok(block) => block,
            Err(SymphoniaError::DecodeError(err)) => {
                log::warn!("Skipping undecodable packet at ts {}: {}", packet.ts(), err);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e).context("Audio decoding failed"),
        };

        let spec = *block.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        let mut buf = SampleBuffer::<f32>::new(block.frames() as u64, spec);
        buf.copy_interleaved_ref(block);
        samples.extend_from_slice(buf.samples());
    }

    let track = AudioTrack::new(samples, channels, sample_rate)?;
    log::info!(
        "Decoded {}: {} frames x {} channels, {}Hz, {:.1}s ({} packets skipped)",
        path.display(),
        track.frames(),
        track.channels(),
        track.sample_rate(),
        track.duration_secs(),
        skipped
    );
    Ok(track)
}

/// Open `path`, detect its container and pick the first stream with a codec.
fn open_stream(path: &Path) -> Result<(Box<dyn FormatReader>, u32, CodecParameters)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to detect audio format")?;

    let (id, params) = detected
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .context("No audio tracks found")?;
    Ok((detected.format, id, params))
}
