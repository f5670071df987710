use std::sync::{Arc, PoisonError};
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample, StreamConfig,
};
use rand::Rng;
use tracing::{error, info};

use crate::error::TrainerError;
use crate::instrument::Instrument;
use crate::note::Note;
use crate::playback::{Playback, PlaybackRequest, Sound};
use crate::state::AppState;

/// Keys the bass can sound.
const BASS_PLAYABLE: std::ops::RangeInclusive<i32> = 1..=40;

/// Spacing of drum hits in a percussion loop, in seconds.
const DRUM_STEP: f32 = 0.12;

/// Ramp at the end of a voice so it does not click.
const RELEASE: f32 = 0.03;

/// Waveform of a voice.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Timbre {
    /// Weights of sine, square, sawtooth and triangle.
    Mix {
        sine: f32,
        square: f32,
        saw: f32,
        triangle: f32,
    },
    /// Noise bursts every [`DRUM_STEP`] seconds.
    Drums,
}

impl Timbre {
    const fn mix(sine: f32, square: f32, saw: f32, triangle: f32) -> Self {
        Timbre::Mix {
            sine,
            square,
            saw,
            triangle,
        }
    }

    pub fn for_sound(sound: Sound) -> Self {
        match sound {
            Sound::Melodic(instrument) => match instrument {
                Instrument::Piano => Self::mix(0.6, 0.0, 0.0, 0.4),
                Instrument::PianoElectric => Self::mix(0.8, 0.2, 0.0, 0.0),
                Instrument::StringEnsemble => Self::mix(0.0, 0.0, 0.5, 0.5),
                Instrument::GuitarAcoustic => Self::mix(0.0, 0.0, 0.3, 0.7),
                Instrument::GuitarDistorted => Self::mix(0.0, 0.6, 0.4, 0.0),
                Instrument::GuitarDrive => Self::mix(0.0, 0.4, 0.6, 0.0),
                Instrument::MatrixBrass => Self::mix(0.0, 0.2, 0.8, 0.0),
                Instrument::Trombone => Self::mix(0.4, 0.0, 0.6, 0.0),
                Instrument::Sax => Self::mix(0.3, 0.3, 0.4, 0.0),
            },
            Sound::Bass => Self::mix(0.7, 0.0, 0.0, 0.3),
            Sound::Percussion => Timbre::Drums,
        }
    }
}

/// A sound in progress.
#[derive(Clone, Debug, PartialEq)]
pub struct Voice {
    pub frequency: f32,
    pub volume: f32,
    pub timbre: Timbre,
    phase: f32,
    elapsed: f32,
    duration: f32,
}

impl Voice {
    pub fn new(frequency: f32, volume: f32, timbre: Timbre, duration: f32) -> Self {
        Self {
            frequency,
            volume,
            timbre,
            phase: 0.0,
            elapsed: 0.0,
            duration,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Produces one sample and advances the voice by `dt` seconds.
    fn next_sample<R: Rng + ?Sized>(&mut self, dt: f32, rng: &mut R) -> f32 {
        let envelope = ((self.duration - self.elapsed) / RELEASE).clamp(0.0, 1.0);
        let value = match self.timbre {
            Timbre::Mix {
                sine,
                square,
                saw,
                triangle,
            } => {
                let p = self.phase;
                let square_wave = if p < 0.5 { 1.0 } else { -1.0 };
                let sine_wave = (2.0 * std::f32::consts::PI * p).sin();
                let sawtooth_wave = 2.0 * p - 1.0;
                let triangle_wave = (2.0 * p - 1.0).abs() * 2.0 - 1.0;
                sine * sine_wave + square * square_wave + saw * sawtooth_wave + triangle * triangle_wave
            }
            Timbre::Drums => {
                let hit = 1.0 - (self.elapsed % DRUM_STEP) / (DRUM_STEP * 0.5);
                hit.max(0.0) * rng.gen_range(-1.0f32..1.0)
            }
        };

        self.phase = (self.phase + self.frequency * dt) % 1.0;
        self.elapsed += dt;
        value * self.volume * envelope
    }
}

/// Playback collaborator that turns requests into voices for the audio thread.
pub struct SynthPlayback {
    state: Arc<AppState>,
    note_duration: f32,
}

impl SynthPlayback {
    pub fn new(state: Arc<AppState>, note_duration: f32) -> Self {
        Self {
            state,
            note_duration,
        }
    }

    fn voice_for(&self, request: &PlaybackRequest) -> Result<Voice, TrainerError> {
        let missing = || TrainerError::MissingResource {
            sound: request.sound.to_string(),
            pitch: request.pitch,
        };
        let playable = match request.sound {
            Sound::Melodic(instrument) => Some(instrument.playable_keys()),
            Sound::Bass => Some(BASS_PLAYABLE),
            Sound::Percussion => None,
        };

        let frequency = match (playable, request.pitch) {
            (Some(keys), Some(pitch)) if keys.contains(&pitch) => Note::new(pitch).frequency(),
            (Some(_), _) => return Err(missing()),
            (None, _) => 0.0,
        };
        Ok(Voice::new(
            frequency,
            request.volume,
            Timbre::for_sound(request.sound),
            self.note_duration,
        ))
    }
}

impl Playback for SynthPlayback {
    fn schedule(&self, request: PlaybackRequest) -> Result<(), TrainerError> {
        let voice = self.voice_for(&request)?;
        self.state
            .voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(voice);
        Ok(())
    }
}

/// Opens the default output device and plays scheduled voices until the
/// application stops.
pub async fn run_playback_engine(state: Arc<AppState>) -> Result<(), TrainerError> {
    tokio::task::spawn_blocking(move || -> Result<(), TrainerError> {
        // Initialize the audio host and device
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| TrainerError::Audio("no output device found".to_string()))?;
        info!(
            "Default output device found: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| TrainerError::Audio(format!("no default output config: {}", e)))?;
        let config = StreamConfig {
            channels: supported_config.channels(),
            sample_rate: supported_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        info!("Audio stream configuration: {:?}", config);

        let render_state = state.clone();
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0 as f32;
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    process_audio_data(data, channels, &render_state, sample_rate);
                },
                |err| {
                    error!("An error occurred on the audio stream: {}", err);
                },
                None,
            )
            .map_err(|e| TrainerError::Audio(format!("failed to build stream: {}", e)))?;

        info!("Starting audio stream...");
        stream
            .play()
            .map_err(|e| TrainerError::Audio(format!("failed to play stream: {}", e)))?;

        // The stream plays as long as it is alive
        while state.is_running() {
            std::thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    })
    .await
    .map_err(|e| TrainerError::Audio(format!("audio thread failed: {}", e)))?
}

/// Fills an interleaved output buffer from the active voices.
fn process_audio_data(data: &mut [f32], channels: usize, state: &AppState, sample_rate: f32) {
    let mut voices = state.voices.lock().unwrap_or_else(PoisonError::into_inner);
    let mut waveform_buffer = state
        .waveform_buffer
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let mut rng = rand::thread_rng();
    let dt = 1.0 / sample_rate;

    waveform_buffer.fill(0.0);
    for (i, frame) in data.chunks_mut(channels.max(1)).enumerate() {
        let sample_value = mix(&mut voices, dt, &mut rng);

        for sample in frame.iter_mut() {
            *sample = Sample::from_sample(sample_value);
        }
        if let Some(slot) = waveform_buffer.get_mut(i) {
            *slot = sample_value;
        }
    }
}

/// Mixes one sample from all voices and drops the ones that have ended.
fn mix<R: Rng + ?Sized>(voices: &mut Vec<Voice>, dt: f32, rng: &mut R) -> f32 {
    let sample: f32 = voices.iter_mut().map(|v| v.next_sample(dt, rng)).sum();
    voices.retain(|v| !v.is_finished());
    sample.clamp(-1.0, 1.0) // Prevent clipping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{BASS_VOLUME, CHORD_VOLUME, PERCUSSION_VOLUME};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn request(sound: Sound, pitch: Option<i32>, volume: f32) -> PlaybackRequest {
        PlaybackRequest {
            sound,
            pitch,
            volume,
        }
    }

    #[test]
    fn test_schedule_creates_voices() {
        let state = AppState::new();
        let synth = SynthPlayback::new(state.clone(), 0.48);
        synth
            .schedule(request(Sound::Melodic(Instrument::Piano), Some(49), CHORD_VOLUME))
            .unwrap();
        synth.schedule(request(Sound::Bass, Some(16), BASS_VOLUME)).unwrap();
        synth
            .schedule(request(Sound::Percussion, None, PERCUSSION_VOLUME))
            .unwrap();

        let voices = state.voices.lock().unwrap();
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].frequency, 440.0);
        assert_eq!(voices[2].timbre, Timbre::Drums);
    }

    #[test]
    fn test_unplayable_keys_are_missing_resources() {
        let state = AppState::new();
        let synth = SynthPlayback::new(state.clone(), 0.48);
        let result = synth.schedule(request(Sound::Melodic(Instrument::Sax), Some(70), CHORD_VOLUME));
        assert_eq!(
            result,
            Err(TrainerError::MissingResource {
                sound: "Sax".to_string(),
                pitch: Some(70)
            })
        );
        assert!(synth.schedule(request(Sound::Bass, None, BASS_VOLUME)).is_err());
        assert!(state.voices.lock().unwrap().is_empty());
    }

    #[test]
    fn test_voices_end_after_duration() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut voices = vec![
            Voice::new(440.0, 0.4, Timbre::for_sound(Sound::Bass), 0.01),
            Voice::new(0.0, 0.5, Timbre::Drums, 0.02),
        ];
        let dt = 1.0 / 1000.0;
        for _ in 0..12 {
            let s = mix(&mut voices, dt, &mut rng);
            assert!((-1.0..=1.0).contains(&s));
        }
        assert_eq!(voices.len(), 1);
        for _ in 0..12 {
            mix(&mut voices, dt, &mut rng);
        }
        assert!(voices.is_empty());
        assert_eq!(mix(&mut voices, dt, &mut rng), 0.0);
    }
}
