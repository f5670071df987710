//! Single pitches on the keyboard.
//!
//! Keys are numbered the way a piano's keys are counted: key 40 is middle C
//! (C4) and key 49 is A4 at 440 Hz. Key 0 sits on G#/Ab.

use std::fmt;

/// Pitch-class names, indexed by `piano_key mod 12`.
const KEY_NAMES: [&str; 12] = [
    "G#/Ab", "A", "A#/Bb", "B", "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G",
];

/// Pitch classes that fall on black keys.
const BLACK_KEYS: [i32; 5] = [0, 2, 5, 7, 10];

/// Offset between MIDI note numbers and piano keys (MIDI 60 = key 40).
pub const MIDI_OFFSET: i32 = 20;

/// Name of the pitch class a piano key belongs to.
pub fn key_name(piano_key: i32) -> &'static str {
    KEY_NAMES[piano_key.rem_euclid(12) as usize]
}

/// An immutable pitch, stored as an absolute piano key index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Note {
    piano_key: i32,
}

impl Note {
    pub fn new(piano_key: i32) -> Self {
        Self { piano_key }
    }

    /// Converts a MIDI note number to the matching piano key.
    pub fn from_midi(midi_note: u8) -> Self {
        Self::new(midi_note as i32 - MIDI_OFFSET)
    }

    pub fn piano_key(&self) -> i32 {
        self.piano_key
    }

    /// The key reduced modulo 12, ignoring octave.
    pub fn pitch_class(&self) -> i32 {
        self.piano_key.rem_euclid(12)
    }

    /// Octave number in scientific pitch notation (key 40 is in octave 4).
    pub fn octave(&self) -> i32 {
        (self.piano_key + 8).div_euclid(12)
    }

    pub fn key_name(&self) -> &'static str {
        key_name(self.piano_key)
    }

    pub fn is_black_key(&self) -> bool {
        BLACK_KEYS.contains(&self.pitch_class())
    }

    /// Shifts the note by a number of semitones.
    pub fn transposed(&self, semitones: i32) -> Self {
        Self::new(self.piano_key + semitones)
    }

    /// Frequency in Hz under twelve-tone equal temperament.
    pub fn frequency(&self) -> f32 {
        440.0 * 2.0_f32.powf((self.piano_key - 49) as f32 / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}{}]", self.piano_key, self.key_name(), self.octave())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_c() {
        let c4 = Note::new(40);
        assert_eq!(c4.pitch_class(), 4);
        assert_eq!(c4.octave(), 4);
        assert_eq!(c4.key_name(), "C");
        assert_eq!(c4.to_string(), "40 [C4]");
    }

    #[test]
    fn test_octave_boundaries() {
        // B3 and C4 straddle the octave change
        assert_eq!(Note::new(39).octave(), 3);
        assert_eq!(Note::new(40).octave(), 4);
        assert_eq!(Note::new(0).octave(), 0);
        assert_eq!(Note::new(3).octave(), 0);
        assert_eq!(Note::new(4).octave(), 1);
    }

    #[test]
    fn test_names_cycle_every_octave() {
        for key in 0..12 {
            assert_eq!(Note::new(key).key_name(), Note::new(key + 36).key_name());
        }
        assert_eq!(Note::new(0).key_name(), "G#/Ab");
        assert_eq!(Note::new(11).key_name(), "G");
    }

    #[test]
    fn test_black_keys() {
        assert!(!Note::new(40).is_black_key()); // C
        assert!(Note::new(41).is_black_key()); // C#
        assert!(Note::new(48).is_black_key()); // G#
        assert!(!Note::new(49).is_black_key()); // A
    }

    #[test]
    fn test_midi_and_frequency() {
        assert_eq!(Note::from_midi(60), Note::new(40));
        assert_eq!(Note::from_midi(69).frequency(), 440.0);
        assert!((Note::new(37).frequency() - 220.0).abs() < 1e-3);
    }
}
