use anyhow::{ensure, Context, Result};
use rubato::{FftFixedIn, Resampler};
use tracing::debug;

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Band-limited resampling to a lower rate. Both rates are rounded to whole hertz. The
/// output is aligned with the input and holds `len * target / source` samples.
pub fn downsample(samples: &[f64], source_rate: f64, target_rate: f64) -> Result<Vec<f64>> {
    ensure!(target_rate > 0.0, "target sample rate must be positive");
    ensure!(
        target_rate <= source_rate,
        "downsample target {target_rate} Hz exceeds source rate {source_rate} Hz"
    );
    let (source_hz, target_hz) = (source_rate.round() as usize, target_rate.round() as usize);
    if samples.is_empty() || source_hz == target_hz {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f64>::new(source_hz, target_hz, CHUNK_SIZE, SUB_CHUNKS, 1)
        .context("failed to build resampler")?;
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * target_hz as f64 / source_hz as f64).round() as usize;

    let mut output = Vec::with_capacity(expected + delay);
    let mut position = 0;
    // Zero padding past the end flushes the filter delay.
    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let start = position.min(samples.len());
        let end = (position + needed).min(samples.len());
        let mut chunk = samples[start..end].to_vec();
        chunk.resize(needed, 0.0);
        let input = vec![chunk];
        let resampled = resampler
            .process(&input, None)
            .context("resampling failed")?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
        position += needed;
    }
    output.drain(..delay);
    output.truncate(expected);

    debug!(
        source_hz,
        target_hz,
        input = samples.len(),
        output = output.len(),
        "downsampled"
    );
    Ok(output)
}
