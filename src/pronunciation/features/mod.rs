pub mod fft;
pub mod formant;
pub mod intensity;
pub mod math;
pub mod mfcc;
pub mod pitch;

use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::pronunciation::{
    FeatureFrame, IntensityFrame, MfccTrack, PitchFrame, PronunciationError, Result, SampleBuffer,
};
use fft::{
    compute_fft, compute_spectrogram, next_power_of_two, spectral_centroid, spectral_flux,
    spectral_rolloff, Spectrogram, SpectrogramConfig, DEFAULT_ROLLOFF_FRACTION,
};
use formant::{FormantExtractor, FormantTrack};
use intensity::{IntensityAnalyzer, Peak};
use math::{frame_starts, hamming_window};
use mfcc::MfccAnalyzer;
use pitch::{pitch_statistics, PitchAnalyzer, PitchStatistics};

/// Per-frame spectral shape descriptors on the spectrogram grid.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpectralTracks {
    pub centroid: Vec<FeatureFrame<f64>>,
    pub rolloff: Vec<FeatureFrame<f64>>,
    pub flux: Vec<FeatureFrame<f64>>,
}

/// Every feature track extracted from one recording.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTracks {
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub pitch: Vec<PitchFrame>,
    pub pitch_statistics: PitchStatistics,
    pub formants: FormantTrack,
    pub mfcc: MfccTrack,
    pub intensity: Vec<IntensityFrame>,
    pub zero_crossing_rate: Vec<FeatureFrame<f64>>,
    pub spectral_tilt: Vec<FeatureFrame<f64>>,
    pub stress_peaks: Vec<Peak>,
    pub spectral: SpectralTracks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectrogram: Option<Spectrogram>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectrogram_diagnostic: Option<String>,
}

/// Runs every analyzer over a recording with one shared configuration.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    spectrogram: SpectrogramConfig,
    pitch: PitchAnalyzer,
    formants: FormantExtractor,
    mfcc: MfccAnalyzer,
    intensity: IntensityAnalyzer,
    required_samples: usize,
}

impl FeatureExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            spectrogram: config.spectrogram.clone(),
            pitch: PitchAnalyzer::new(config.pitch),
            formants: FormantExtractor::new(config.formants),
            mfcc: MfccAnalyzer::new(config.mfcc),
            intensity: IntensityAnalyzer::new(config.intensity),
            required_samples: config.min_samples(),
        }
    }

    /// Shortest recording every analyzer can produce at least one frame for.
    pub fn required_samples(&self) -> usize {
        self.required_samples
    }

    pub fn extract(&self, buffer: &SampleBuffer) -> Result<FeatureTracks> {
        self.extract_labelled("input", buffer)
    }

    /// Same as [`FeatureExtractor::extract`], naming the recording in any error.
    pub fn extract_labelled(
        &self,
        label: &'static str,
        buffer: &SampleBuffer,
    ) -> Result<FeatureTracks> {
        if buffer.len() < self.required_samples {
            return Err(PronunciationError::BufferTooShort {
                label,
                samples: buffer.len(),
                required: self.required_samples,
            });
        }
        let samples = buffer.to_f64();
        let rate = f64::from(buffer.sample_rate());

        let pitch = self.pitch.analyze(&samples, rate);
        let pitch_statistics = pitch_statistics(&pitch);
        let formants = self.formants.extract(&samples, rate);
        let mfcc = self.mfcc.analyze(&samples, rate);
        let intensity = self.intensity.extract_intensity(&samples, rate);
        let stress_peaks = self.intensity.find_peaks(&intensity);
        let spectrogram = compute_spectrogram(&samples, rate, &self.spectrogram);
        let spectral = spectral_tracks(&samples, rate, &self.spectrogram);

        debug!(
            label,
            duration = buffer.duration_secs(),
            pitch_frames = pitch.len(),
            voiced = pitch_statistics.voiced_percentage,
            formant_frames = formants.frames.len(),
            mfcc_frames = mfcc.frame_count(),
            peaks = stress_peaks.len(),
            "features extracted"
        );

        Ok(FeatureTracks {
            sample_rate: buffer.sample_rate(),
            duration_secs: buffer.duration_secs(),
            pitch_statistics,
            formants,
            mfcc,
            zero_crossing_rate: self.intensity.extract_zcr(&samples, rate),
            spectral_tilt: self.intensity.extract_spectral_tilt(&samples, rate),
            intensity,
            stress_peaks,
            spectral,
            spectrogram_diagnostic: spectrogram.diagnostic.clone(),
            spectrogram: Some(spectrogram),
            pitch,
        })
    }
}

fn spectral_tracks(samples: &[f64], sample_rate: f64, config: &SpectrogramConfig) -> SpectralTracks {
    let fft_size = next_power_of_two(config.fft_size);
    let window = hamming_window(fft_size);
    let mut tracks = SpectralTracks::default();
    let mut previous: Option<Vec<f64>> = None;
    for start in frame_starts(samples.len(), fft_size, config.hop_size) {
        let frame: Vec<f64> = samples[start..start + fft_size]
            .iter()
            .zip(&window)
            .map(|(s, w)| s * w)
            .collect();
        let magnitude = compute_fft(&frame);
        let time = start as f64 / sample_rate;
        tracks.centroid.push(FeatureFrame {
            time,
            value: spectral_centroid(&magnitude, sample_rate, fft_size),
        });
        tracks.rolloff.push(FeatureFrame {
            time,
            value: spectral_rolloff(&magnitude, sample_rate, fft_size, DEFAULT_ROLLOFF_FRACTION),
        });
        tracks.flux.push(FeatureFrame {
            time,
            value: previous
                .as_deref()
                .map_or(0.0, |prev| spectral_flux(prev, &magnitude)),
        });
        previous = Some(magnitude);
    }
    tracks
}
