//! Chord ear training.
//!
//! A [`RoundCoordinator`] keeps any number of participants in lock-step: once
//! all of them are ready it picks a chord, tells everyone about it and hands
//! it to a [`Playback`] sink. Guesses flow to a [`FeedbackBoard`] that colours
//! keyboard keys by how often they were guessed.

pub mod audio;
pub mod chord;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod feedback;
pub mod instrument;
pub mod midi;
pub mod note;
pub mod participant;
pub mod playback;
pub mod score;
pub mod state;
pub mod ui;

pub use chord::{Chord, ChordQuality};
pub use config::Config;
pub use coordinator::{Round, RoundCoordinator, Stimulus};
pub use error::TrainerError;
pub use feedback::{FeedbackBoard, FeedbackParams, GuessEvent};
pub use note::Note;
pub use participant::{Participant, ParticipantId};
pub use playback::Playback;
