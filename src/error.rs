use thiserror::Error;

use crate::participant::ParticipantId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainerError {
    /// A chord quality index outside the fixed table.
    #[error("Invalid chord quality index: {0}")]
    InvalidQuality(i32),

    /// Requested an inversion the chord does not have.
    #[error("Inversion {index} out of range (chord has {available} voicings)")]
    InversionOutOfRange { index: usize, available: usize },

    #[error("Participant {0} is not registered")]
    UnknownParticipant(ParticipantId),

    /// A participant reported ready twice before the round completed.
    #[error("Participant {0} is already ready for this round")]
    DuplicateReady(ParticipantId),

    /// A guess lands on a key the feedback board does not have.
    #[error("Key {0} is not on the feedback board")]
    UnknownKey(i32),

    /// The playback collaborator has nothing to play for this request.
    #[error("No audio resource for {sound} at key {pitch:?}")]
    MissingResource { sound: String, pitch: Option<i32> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Audio device error: {0}")]
    Audio(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("UI error: {0}")]
    Ui(String),
}
