//! Boundary to whatever actually makes sound.
//!
//! The coordinator only issues abstract [`PlaybackRequest`]s. A sink may fail
//! a request with [`TrainerError::MissingResource`]; the round goes on without it.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::TrainerError;
use crate::instrument::Instrument;

pub const CHORD_VOLUME: f32 = 0.4;
pub const BASS_VOLUME: f32 = 0.7;
pub const PERCUSSION_VOLUME: f32 = 0.5;

/// What kind of sound a request asks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sound {
    Melodic(Instrument),
    Bass,
    Percussion,
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sound::Melodic(instrument) => write!(f, "{}", instrument),
            Sound::Bass => f.write_str("Bass"),
            Sound::Percussion => f.write_str("DrumLoop"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackRequest {
    pub sound: Sound,
    /// Piano key; percussion loops have none.
    pub pitch: Option<i32>,
    pub volume: f32,
}

pub trait Playback: Send + Sync {
    fn schedule(&self, request: PlaybackRequest) -> Result<(), TrainerError>;
}

/// Sink that only logs requests, for headless runs.
#[derive(Debug, Default)]
pub struct LogPlayback;

impl Playback for LogPlayback {
    fn schedule(&self, request: PlaybackRequest) -> Result<(), TrainerError> {
        debug!(
            "Playback: {} key={:?} volume={:.2}",
            request.sound, request.pitch, request.volume
        );
        Ok(())
    }
}

/// Sink that remembers every request it accepts.
///
/// Requests for keys outside `available` are refused as missing resources.
#[derive(Debug, Default)]
pub struct RecordingPlayback {
    requests: Mutex<Vec<PlaybackRequest>>,
    available: Option<std::ops::RangeInclusive<i32>>,
}

impl RecordingPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accepts pitched requests within `keys`.
    pub fn with_available_keys(keys: std::ops::RangeInclusive<i32>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            available: Some(keys),
        }
    }

    pub fn requests(&self) -> Vec<PlaybackRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Playback for RecordingPlayback {
    fn schedule(&self, request: PlaybackRequest) -> Result<(), TrainerError> {
        if let (Some(keys), Some(pitch)) = (&self.available, request.pitch) {
            if !keys.contains(&pitch) {
                return Err(TrainerError::MissingResource {
                    sound: request.sound.to_string(),
                    pitch: request.pitch,
                });
            }
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_names() {
        assert_eq!(Sound::Melodic(Instrument::Sax).to_string(), "Sax");
        assert_eq!(Sound::Bass.to_string(), "Bass");
        assert_eq!(Sound::Percussion.to_string(), "DrumLoop");
    }

    #[test]
    fn test_recording_refuses_missing_keys() {
        let sink = RecordingPlayback::with_available_keys(20..=30);
        let ok = PlaybackRequest {
            sound: Sound::Bass,
            pitch: Some(20),
            volume: BASS_VOLUME,
        };
        let missing = PlaybackRequest {
            pitch: Some(31),
            ..ok.clone()
        };
        let drums = PlaybackRequest {
            sound: Sound::Percussion,
            pitch: None,
            volume: PERCUSSION_VOLUME,
        };

        assert!(sink.schedule(ok.clone()).is_ok());
        assert!(matches!(
            sink.schedule(missing),
            Err(TrainerError::MissingResource { pitch: Some(31), .. })
        ));
        assert!(sink.schedule(drums.clone()).is_ok());
        assert_eq!(sink.requests(), vec![ok, drums]);
    }
}
