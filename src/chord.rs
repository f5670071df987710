//! Chord theory: qualities, voicings and comparison.
//!
//! A [`Chord`] is built from a [`ChordQuality`] interval pattern stacked on a
//! root key. Inversions raise the lowest note by an octave and move it to the
//! top, so every voicing keeps the same pitch-class content.
//!
//! Comparison is split into three independent facts:
//! - [`Chord::is_equivalent`] - same sorted pitch classes, ignoring octave and inversion
//! - [`Chord::same_quality`] - same quality tag
//! - [`Chord::same_key`] - same root pitch class
//!
//! None of them implies the others. C major 6th and A minor 7th are equivalent
//! but have different qualities and keys.

use std::fmt;

use rand::Rng;

use crate::error::TrainerError;
use crate::note::{key_name, Note};

/// The fixed set of chord qualities.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Suspended2,
    Suspended4,
    MajorSixth,
    MinorSixth,
    MajorSeventh,
    MinorSeventh,
    DominantSeventh,
}

impl ChordQuality {
    /// All qualities, in index order.
    pub const ALL: [ChordQuality; 11] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Diminished,
        ChordQuality::Augmented,
        ChordQuality::Suspended2,
        ChordQuality::Suspended4,
        ChordQuality::MajorSixth,
        ChordQuality::MinorSixth,
        ChordQuality::MajorSeventh,
        ChordQuality::MinorSeventh,
        ChordQuality::DominantSeventh,
    ];

    /// Ascending semitone offsets from the root.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
            ChordQuality::Suspended2 => &[0, 2, 7],
            ChordQuality::Suspended4 => &[0, 5, 7],
            ChordQuality::MajorSixth => &[0, 4, 7, 9],
            ChordQuality::MinorSixth => &[0, 3, 7, 9],
            ChordQuality::MajorSeventh => &[0, 4, 7, 11],
            ChordQuality::MinorSeventh => &[0, 3, 7, 10],
            ChordQuality::DominantSeventh => &[0, 4, 7, 10],
        }
    }

    /// Position in [`ChordQuality::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ChordQuality::Major => "Major",
            ChordQuality::Minor => "Minor",
            ChordQuality::Diminished => "Diminished",
            ChordQuality::Augmented => "Augmented",
            ChordQuality::Suspended2 => "Suspended2",
            ChordQuality::Suspended4 => "Suspended4",
            ChordQuality::MajorSixth => "MajorSixth",
            ChordQuality::MinorSixth => "MinorSixth",
            ChordQuality::MajorSeventh => "MajorSeventh",
            ChordQuality::MinorSeventh => "MinorSeventh",
            ChordQuality::DominantSeventh => "DominantSeventh",
        }
    }

    /// Picks a quality uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl TryFrom<i32> for ChordQuality {
    type Error = TrainerError;

    fn try_from(index: i32) -> Result<Self, Self::Error> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(TrainerError::InvalidQuality(index))
    }
}

impl fmt::Display for ChordQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A voiced chord: quality, inversion and the notes from lowest to highest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chord {
    quality: ChordQuality,
    inversion: usize,
    notes: Vec<Note>,
}

impl Chord {
    /// Builds the root-position chord of `quality` on `root_key`.
    pub fn new(quality: ChordQuality, root_key: i32) -> Self {
        let notes = quality
            .intervals()
            .iter()
            .map(|interval| Note::new(root_key + interval))
            .collect();

        Self {
            quality,
            inversion: 0,
            notes,
        }
    }

    /// Builds a chord from a raw quality index, as produced by a decision component.
    pub fn from_index(quality: i32, root_key: i32) -> Result<Self, TrainerError> {
        Ok(Self::new(ChordQuality::try_from(quality)?, root_key))
    }

    pub fn quality(&self) -> ChordQuality {
        self.quality
    }

    /// 0 for root position.
    pub fn inversion(&self) -> usize {
        self.inversion
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn piano_keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.notes.iter().map(Note::piano_key)
    }

    /// The note the chord is named after, wherever it sits in the voicing.
    pub fn root_note(&self) -> Note {
        let n = self.notes.len();
        self.notes[(n - self.inversion % n) % n]
    }

    /// Root pitch class.
    pub fn key(&self) -> i32 {
        self.root_note().pitch_class()
    }

    /// Sorted pitch classes of all notes.
    pub fn pitch_classes(&self) -> Vec<i32> {
        let mut classes: Vec<i32> = self.notes.iter().map(Note::pitch_class).collect();
        classes.sort_unstable();
        classes
    }

    /// Lazily yields the `len - 1` further inversions of this voicing.
    pub fn inversions(&self) -> Inversions<'_> {
        Inversions {
            chord: self,
            step: 0,
        }
    }

    /// Inversion `i` counted from this voicing; 0 is the chord itself.
    pub fn inversion_of(&self, i: usize) -> Result<Chord, TrainerError> {
        if i == 0 {
            return Ok(self.clone());
        }
        self.inversions()
            .nth(i - 1)
            .ok_or(TrainerError::InversionOutOfRange {
                index: i,
                available: self.notes.len(),
            })
    }

    /// Picks one of the chord's voicings (itself included) uniformly.
    pub fn random_inversion<R: Rng + ?Sized>(&self, rng: &mut R) -> Chord {
        self.rotated(rng.gen_range(0..self.notes.len()))
    }

    /// Rotates the voicing left by `step < len` places, raising every wrapped
    /// note by an octave.
    fn rotated(&self, step: usize) -> Chord {
        let n = self.notes.len();
        let notes = (0..n)
            .map(|j| {
                let src = j + step;
                let octaves = (src / n) as i32;
                self.notes[src % n].transposed(12 * octaves)
            })
            .collect();

        Chord {
            quality: self.quality,
            inversion: (self.inversion + step) % n,
            notes,
        }
    }

    /// Same pitch content, regardless of octave and inversion.
    pub fn is_equivalent(&self, other: &Chord) -> bool {
        self.pitch_classes() == other.pitch_classes()
    }

    pub fn same_quality(&self, other: &Chord) -> bool {
        self.quality == other.quality
    }

    pub fn same_key(&self, other: &Chord) -> bool {
        self.key() == other.key()
    }

    /// Shifts every note by the same number of semitones.
    pub fn transposed(&self, semitones: i32) -> Chord {
        Chord {
            quality: self.quality,
            inversion: self.inversion,
            notes: self.notes.iter().map(|n| n.transposed(semitones)).collect(),
        }
    }

    /// Names the chord formed by a set of sounding keys.
    ///
    /// Octave doublings are ignored. When several qualities share the same
    /// pitch classes, a chord rooted on the lowest sounding key is preferred.
    /// The result is a root-position chord built on the root's pitch class.
    pub fn identify(keys: &[i32]) -> Option<Chord> {
        let lowest = keys.iter().min()?.rem_euclid(12);
        let mut held: Vec<i32> = keys.iter().map(|k| k.rem_euclid(12)).collect();
        held.sort_unstable();
        held.dedup();
        if held.len() < 3 {
            return None;
        }

        let roots = std::iter::once(lowest).chain((0..12).filter(|&pc| pc != lowest));
        roots
            .flat_map(|root| ChordQuality::ALL.iter().map(move |&q| Chord::new(q, root)))
            .find(|candidate| candidate.pitch_classes() == held)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key();
        write!(f, "{} [{}] {} ", key_name(key), key, self.quality)?;
        if self.inversion > 0 {
            write!(f, "Inversion {}", self.inversion)?;
        } else {
            f.write_str("Root")?;
        }

        let names: Vec<String> = self.notes.iter().map(Note::to_string).collect();
        write!(f, " ({})", names.join(", "))
    }
}

/// Iterator over the inversions of a chord.
///
/// Step `s` rotates the voicing left by `s` places and raises every wrapped
/// note by an octave, which is the same as repeatedly moving the lowest note
/// up to the top.
pub struct Inversions<'a> {
    chord: &'a Chord,
    step: usize,
}

impl Iterator for Inversions<'_> {
    type Item = Chord;

    fn next(&mut self) -> Option<Chord> {
        if self.step + 1 >= self.chord.notes.len() {
            return None;
        }
        self.step += 1;
        Some(self.chord.rotated(self.step))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.chord.notes.len().saturating_sub(1 + self.step);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Inversions<'_> {}
