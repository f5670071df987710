use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use midir::{Ignore, MidiInput};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::chord::Chord;
use crate::coordinator::Round;
use crate::error::TrainerError;
use crate::feedback::GuessEvent;
use crate::note::Note;
use crate::state::AppState;

/// A key change decoded from a MIDI message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    Down(i32),
    Up(i32),
}

/// Decodes note-on/note-off messages; a note-on with velocity 0 is a release.
pub fn parse_message(message: &[u8]) -> Option<KeyEvent> {
    if message.len() < 3 {
        return None;
    }
    let status = message[0] & 0xF0;
    let key = Note::from_midi(message[1]).piano_key();
    match (status, message[2]) {
        (0x90, v) if v > 0 => Some(KeyEvent::Down(key)),
        (0x80, _) | (0x90, 0) => Some(KeyEvent::Up(key)),
        _ => None,
    }
}

/// Turns held keys into guesses.
struct GuessTracker {
    state: Arc<AppState>,
    rounds: watch::Receiver<Option<Round>>,
    guesses: mpsc::UnboundedSender<GuessEvent>,
    last: Option<Chord>,
}

impl GuessTracker {
    /// Applies a key change and returns the guess it produced, if the held
    /// keys now name a chord different from the last one reported.
    fn apply(&mut self, event: KeyEvent) -> Option<GuessEvent> {
        let mut held = self
            .state
            .held_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match event {
            KeyEvent::Down(key) => {
                held.insert(key);
            }
            KeyEvent::Up(key) => {
                held.remove(&key);
            }
        }

        let keys: Vec<i32> = held.iter().copied().collect();
        drop(held);
        let chord = Chord::identify(&keys)?;
        if self.last.as_ref() == Some(&chord) {
            return None;
        }
        self.last = Some(chord.clone());

        Some(GuessEvent {
            participant: None,
            played: self.rounds.borrow().as_ref().map(|r| r.chord().clone()),
            guessed: chord,
        })
    }
}

/// Listens on a MIDI input port and sends the chords played there to the
/// feedback path.
pub async fn run_midi_listener(
    port_index: usize,
    state: Arc<AppState>,
    rounds: watch::Receiver<Option<Round>>,
    guesses: mpsc::UnboundedSender<GuessEvent>,
) -> Result<(), TrainerError> {
    tokio::task::spawn_blocking(move || -> Result<(), TrainerError> {
        // Initialize MIDI input
        let mut midi_input = MidiInput::new("Chord Trainer Input")
            .map_err(|e| TrainerError::Midi(format!("failed to create MIDI input: {}", e)))?;
        midi_input.ignore(Ignore::All);

        // List available MIDI ports
        let in_ports = midi_input.ports();
        info!("Available MIDI input ports:");
        for (i, port) in in_ports.iter().enumerate() {
            info!(
                "Port {}: {}",
                i,
                midi_input
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown".to_string())
            );
        }

        let in_port = in_ports
            .get(port_index)
            .ok_or_else(|| TrainerError::Midi(format!("no MIDI input port {}", port_index)))?;
        info!(
            "Using MIDI input: {}",
            midi_input
                .port_name(in_port)
                .unwrap_or_else(|_| "Unknown".to_string())
        );

        let closed = guesses.clone();
        let tracker = GuessTracker {
            state: state.clone(),
            rounds,
            guesses,
            last: None,
        };

        // Connect to the selected MIDI port
        let _conn = midi_input
            .connect(
                in_port,
                "Chord Trainer Listener",
                move |_, message, tracker| {
                    let Some(event) = parse_message(message) else {
                        debug!("Unhandled MIDI message: {:?}", message);
                        return;
                    };
                    if let Some(guess) = tracker.apply(event) {
                        debug!("MIDI guess: {}", guess.guessed);
                        if tracker.guesses.send(guess).is_err() {
                            warn!("Feedback path closed, dropping MIDI guess");
                        }
                    }
                },
                tracker,
            )
            .map_err(|e| TrainerError::Midi(format!("failed to connect to MIDI input: {}", e)))?;

        info!("MIDI listener connected and running");

        // Keep the connection open until the feedback path goes away
        while state.is_running() && !closed.is_closed() {
            std::thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    })
    .await
    .map_err(|e| TrainerError::Midi(format!("MIDI thread failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordQuality;

    fn tracker() -> (GuessTracker, mpsc::UnboundedReceiver<GuessEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_, rounds) = watch::channel(None);
        let tracker = GuessTracker {
            state: AppState::new(),
            rounds,
            guesses: tx,
            last: None,
        };
        (tracker, rx)
    }

    #[test]
    fn test_parse_message() {
        assert_eq!(parse_message(&[0x90, 60, 100]), Some(KeyEvent::Down(40)));
        assert_eq!(parse_message(&[0x91, 60, 0]), Some(KeyEvent::Up(40)));
        assert_eq!(parse_message(&[0x80, 64, 12]), Some(KeyEvent::Up(44)));
        assert_eq!(parse_message(&[0xB0, 7, 100]), None);
        assert_eq!(parse_message(&[0x90, 60]), None);
    }

    #[test]
    fn test_held_chord_becomes_one_guess() {
        let (mut tracker, _rx) = tracker();
        assert!(tracker.apply(KeyEvent::Down(40)).is_none());
        assert!(tracker.apply(KeyEvent::Down(44)).is_none());

        let guess = tracker.apply(KeyEvent::Down(47)).expect("C major is held");
        assert_eq!(guess.guessed, Chord::new(ChordQuality::Major, 4));
        assert_eq!(guess.played, None);

        // doubling the root names the same chord again
        assert!(tracker.apply(KeyEvent::Down(52)).is_none());

        tracker.apply(KeyEvent::Up(44));
        let guess = tracker.apply(KeyEvent::Down(43)).expect("C minor is held");
        assert_eq!(guess.guessed.quality(), ChordQuality::Minor);
        assert_eq!(
            tracker.state.held_keys.lock().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![40, 43, 47, 52]
        );
    }
}
