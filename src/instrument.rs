//! Instrument catalog used for stimulus selection.

use std::fmt;
use std::ops::{Range, RangeInclusive};

use rand::Rng;

/// Melodic instruments a chord can be played on. Bass is handled separately.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instrument {
    StringEnsemble,
    GuitarAcoustic,
    GuitarDistorted,
    GuitarDrive,
    MatrixBrass,
    Piano,
    PianoElectric,
    Trombone,
    Sax,
}

impl Instrument {
    pub const MELODIC: [Instrument; 9] = [
        Instrument::StringEnsemble,
        Instrument::GuitarAcoustic,
        Instrument::GuitarDistorted,
        Instrument::GuitarDrive,
        Instrument::MatrixBrass,
        Instrument::Piano,
        Instrument::PianoElectric,
        Instrument::Trombone,
        Instrument::Sax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::StringEnsemble => "StringEnsemble",
            Instrument::GuitarAcoustic => "GuitarAcoustic",
            Instrument::GuitarDistorted => "GuitarDistorted",
            Instrument::GuitarDrive => "GuitarDrive",
            Instrument::MatrixBrass => "MatrixBrass",
            Instrument::Piano => "Piano",
            Instrument::PianoElectric => "PianoElectric",
            Instrument::Trombone => "Trombone",
            Instrument::Sax => "Sax",
        }
    }

    /// Keys a chord root may be drawn from (upper bound exclusive).
    pub fn root_range(self) -> Range<i32> {
        match self {
            // monophonic wind/brass: narrow band
            Instrument::Sax | Instrument::Trombone => 25..37,
            // sustained strings and guitars: wide band
            Instrument::StringEnsemble
            | Instrument::GuitarAcoustic
            | Instrument::GuitarDistorted
            | Instrument::GuitarDrive => 20..44,
            _ => 25..49,
        }
    }

    /// Keys the instrument can actually sound.
    pub fn playable_keys(self) -> RangeInclusive<i32> {
        match self {
            Instrument::Sax => 25..=56,
            Instrument::Trombone => 20..=57,
            Instrument::MatrixBrass => 20..=64,
            Instrument::StringEnsemble => 11..=76,
            Instrument::GuitarAcoustic | Instrument::GuitarDistorted | Instrument::GuitarDrive => {
                20..=68
            }
            Instrument::Piano | Instrument::PianoElectric => 1..=88,
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::MELODIC[rng.gen_range(0..Self::MELODIC.len())]
    }

    /// Draws a root key from [`Instrument::root_range`].
    pub fn random_root<R: Rng + ?Sized>(self, rng: &mut R) -> i32 {
        rng.gen_range(self.root_range())
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register the bass line is played in.
pub const BASS_KEYS: RangeInclusive<i32> = 8..=19;

/// Bass key for a root: its pitch class moved into [`BASS_KEYS`].
pub fn bass_key(root_key: i32) -> i32 {
    let key = root_key.rem_euclid(12);
    if key < *BASS_KEYS.start() {
        key + 12
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_root_ranges() {
        assert_eq!(Instrument::Sax.root_range(), 25..37);
        assert_eq!(Instrument::Trombone.root_range(), 25..37);
        assert_eq!(Instrument::GuitarDrive.root_range(), 20..44);
        assert_eq!(Instrument::Piano.root_range(), 25..49);
        assert_eq!(Instrument::MatrixBrass.root_range(), 25..49);
    }

    #[test]
    fn test_random_root_within_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for instrument in Instrument::MELODIC {
            for _ in 0..50 {
                let root = instrument.random_root(&mut rng);
                assert!(instrument.root_range().contains(&root));
                assert!(instrument.playable_keys().contains(&root));
            }
        }
    }

    #[test]
    fn test_bass_key_register() {
        for root in 0..88 {
            let bass = bass_key(root);
            assert!(BASS_KEYS.contains(&bass), "root {} gave {}", root, bass);
            assert_eq!(bass % 12, root % 12);
        }
        assert_eq!(bass_key(40), 16);
        assert_eq!(bass_key(27), 15);
        assert_eq!(bass_key(32), 8);
    }
}
