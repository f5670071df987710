//! Accumulates evidence from guesses per physical key and turns it into
//! colours. Each key keeps two counters bounded to `0..=max_count`:
//! - root evidence: the key was the root of a guess
//! - chord-tone evidence: the key was another note of a guess
//!
//! Every guess moves every counter by one, up on a hit and down otherwise, so
//! keys only light up when guesses agree over time.
//!
//! Counters map to an intensity through a power curve that is zero up to
//! `threshold`. The colour of a key is its base colour blended toward the
//! chord-tone highlight, then toward the root highlight, so a strong root
//! always shows through.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::chord::Chord;
use crate::error::TrainerError;
use crate::note::Note;
use crate::participant::ParticipantId;
use crate::score::grade;
use crate::state::AppState;

/// Guesses with a root pitch class below this are drawn an octave higher.
pub const LOW_KEY_SHIFT_BELOW: i32 = 4;

/// An RGBA colour with components in `0.0..=1.0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Linear blend toward `other`; `t` is clamped to `0..=1`.
    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: f32, b: f32| a * (1.0 - t) + b * t;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Palette {
    pub root: Color,
    pub chord_tone: Color,
    pub white_key: Color,
    pub black_key: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            root: Color::rgb(1.0, 0.35, 0.1),
            chord_tone: Color::rgb(0.2, 0.6, 1.0),
            white_key: Color::WHITE,
            black_key: Color::rgb(0.1, 0.1, 0.1),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FeedbackParams {
    pub max_count: u32,
    pub threshold: u32,
    pub exponent: f32,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self {
            max_count: 24,
            threshold: 4,
            exponent: 1.0,
        }
    }
}

impl FeedbackParams {
    /// Maps a counter onto `0..=1`.
    pub fn intensity(&self, count: u32) -> f32 {
        if count <= self.threshold {
            return 0.0;
        }
        let v = (count - self.threshold) as f32 / (self.max_count - self.threshold) as f32;
        v.powf(self.exponent)
    }
}

/// A guess as seen by the feedback path.
#[derive(Clone, Debug, PartialEq)]
pub struct GuessEvent {
    /// `None` for guesses that do not come from a registered participant.
    pub participant: Option<ParticipantId>,
    /// Chord of the round the guess answers, when known.
    pub played: Option<Chord>,
    pub guessed: Chord,
}

#[derive(Copy, Clone, Debug)]
struct KeyEvidence {
    root: u32,
    chord_tone: u32,
    base: Color,
}

pub struct FeedbackBoard {
    params: FeedbackParams,
    palette: Palette,
    keys: BTreeMap<i32, KeyEvidence>,
}

impl FeedbackBoard {
    pub fn new(keys: impl IntoIterator<Item = i32>, params: FeedbackParams, palette: Palette) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| {
                let base = if Note::new(k).is_black_key() {
                    palette.black_key
                } else {
                    palette.white_key
                };
                (
                    k,
                    KeyEvidence {
                        root: 0,
                        chord_tone: 0,
                        base,
                    },
                )
            })
            .collect();

        Self {
            params,
            palette,
            keys,
        }
    }

    pub fn params(&self) -> &FeedbackParams {
        &self.params
    }

    pub fn keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.keys.keys().copied()
    }

    pub fn root_count(&self, key: i32) -> Option<u32> {
        self.keys.get(&key).map(|e| e.root)
    }

    pub fn chord_tone_count(&self, key: i32) -> Option<u32> {
        self.keys.get(&key).map(|e| e.chord_tone)
    }

    /// Where a guess lands on the board: root key and the other keys.
    pub fn placement(guessed: &Chord) -> (i32, Vec<i32>) {
        let shift = if guessed.key() < LOW_KEY_SHIFT_BELOW { 12 } else { 0 };
        let shifted = guessed.transposed(shift);
        let root = shifted.root_note().piano_key();
        let others = shifted.piano_keys().filter(|&k| k != root).collect();
        (root, others)
    }

    /// Updates every key's counters from one guess.
    ///
    /// A guess that would land on keys the board does not have is rejected and
    /// leaves all counters untouched.
    pub fn record_guess(&mut self, event: &GuessEvent) -> Result<(), TrainerError> {
        let (root, others) = Self::placement(&event.guessed);
        if let Some(&missing) = std::iter::once(&root)
            .chain(others.iter())
            .find(|&&k| !self.keys.contains_key(&k))
        {
            return Err(TrainerError::UnknownKey(missing));
        }

        let max = self.params.max_count;
        let step = |count: u32, hit: bool| {
            if hit {
                (count + 1).min(max)
            } else {
                count.saturating_sub(1)
            }
        };
        for (&key, evidence) in self.keys.iter_mut() {
            evidence.root = step(evidence.root, key == root);
            evidence.chord_tone = step(evidence.chord_tone, others.contains(&key));
        }

        match &event.played {
            Some(played) => debug!(
                "Guess {} for {} (equivalent: {})",
                event.guessed,
                played,
                played.is_equivalent(&event.guessed)
            ),
            None => debug!("Guess {}", event.guessed),
        }
        Ok(())
    }

    pub fn intensity(&self, count: u32) -> f32 {
        self.params.intensity(count)
    }

    pub fn render_colors(&self) -> BTreeMap<i32, Color> {
        self.keys
            .iter()
            .map(|(&key, e)| {
                let color = e
                    .base
                    .lerp(self.palette.chord_tone, self.intensity(e.chord_tone))
                    .lerp(self.palette.root, self.intensity(e.root));
                trace!("Key {} root={} tone={}", key, e.root, e.chord_tone);
                (key, color)
            })
            .collect()
    }

    /// Clears all evidence.
    pub fn reset(&mut self) {
        for evidence in self.keys.values_mut() {
            evidence.root = 0;
            evidence.chord_tone = 0;
        }
    }
}

/// Single writer of the board: applies guesses in arrival order, grades the
/// ones that carry a played chord, and publishes colours for rendering.
pub async fn run_feedback_writer(
    mut board: FeedbackBoard,
    mut guesses: mpsc::UnboundedReceiver<GuessEvent>,
    state: Arc<AppState>,
) {
    publish(&board, &state);
    while let Some(event) = guesses.recv().await {
        if let Some(played) = &event.played {
            state
                .stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(played, grade(played, &event.guessed));
        }
        match board.record_guess(&event) {
            Ok(()) => publish(&board, &state),
            Err(e) => warn!("Ignored guess {}: {}", event.guessed, e),
        }
    }
    info!("Feedback writer stopped");
}

fn publish(board: &FeedbackBoard, state: &AppState) {
    let colors = board.render_colors();
    *state
        .key_colors
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = colors;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordQuality;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn board() -> FeedbackBoard {
        FeedbackBoard::new(4..=27, FeedbackParams::default(), Palette::default())
    }

    fn guess(quality: ChordQuality, root: i32) -> GuessEvent {
        GuessEvent {
            participant: None,
            played: None,
            guessed: Chord::new(quality, root),
        }
    }

    #[test]
    fn test_intensity_curve() {
        let params = FeedbackParams::default();
        assert_eq!(params.intensity(0), 0.0);
        assert_eq!(params.intensity(4), 0.0);
        assert_eq!(params.intensity(24), 1.0);
        assert_eq!(params.intensity(14), 0.5);

        let squared = FeedbackParams {
            exponent: 2.0,
            ..params
        };
        assert_eq!(squared.intensity(14), 0.25);
    }

    #[test]
    fn test_placement_shifts_low_roots() {
        // C major stays put
        assert_eq!(
            FeedbackBoard::placement(&Chord::new(ChordQuality::Major, 4)),
            (4, vec![8, 11])
        );
        // A minor (key 1) moves up an octave
        assert_eq!(
            FeedbackBoard::placement(&Chord::new(ChordQuality::Minor, 1)),
            (13, vec![16, 20])
        );
    }

    #[test]
    fn test_counts_move_toward_guess() {
        let mut board = board();
        for _ in 0..10 {
            board.record_guess(&guess(ChordQuality::Major, 4)).unwrap();
        }
        assert_eq!(board.root_count(4), Some(10));
        assert_eq!(board.chord_tone_count(8), Some(10));
        assert_eq!(board.chord_tone_count(11), Some(10));
        assert_eq!(board.root_count(8), Some(0));
        assert_eq!(board.chord_tone_count(4), Some(0));

        board.record_guess(&guess(ChordQuality::Minor, 6)).unwrap();
        assert_eq!(board.root_count(4), Some(9));
        assert_eq!(board.root_count(6), Some(1));
    }

    #[test]
    fn test_counts_stay_in_bounds() {
        let mut board = board();
        let mut rng = StdRng::seed_from_u64(12);
        for i in 0..500 {
            let event = if i % 3 == 0 {
                guess(ChordQuality::Major, 4)
            } else {
                guess(ChordQuality::random(&mut rng), rng.gen_range(0..12))
            };
            board.record_guess(&event).unwrap();
            for key in 4..=27 {
                assert!(board.root_count(key).unwrap() <= 24);
                assert!(board.chord_tone_count(key).unwrap() <= 24);
            }
        }
        for _ in 0..100 {
            board.record_guess(&guess(ChordQuality::Major, 4)).unwrap();
        }
        assert_eq!(board.root_count(4), Some(24));
        assert_eq!(board.root_count(5), Some(0));
    }

    #[test]
    fn test_rejected_guess_leaves_counters() {
        let mut board = FeedbackBoard::new(4..=12, FeedbackParams::default(), Palette::default());
        board.record_guess(&guess(ChordQuality::Major, 4)).unwrap();

        let result = board.record_guess(&guess(ChordQuality::Major, 6));
        assert_eq!(result, Err(TrainerError::UnknownKey(13)));
        assert_eq!(board.root_count(4), Some(1));
        assert_eq!(board.chord_tone_count(8), Some(1));
        assert_eq!(board.root_count(6), Some(0));
    }

    #[test]
    fn test_colors_blend_root_last() {
        let palette = Palette::default();
        let mut board = FeedbackBoard::new(4..=27, FeedbackParams::default(), palette);
        let colors = board.render_colors();
        assert_eq!(colors[&4], palette.white_key);
        assert_eq!(colors[&5], palette.black_key);

        for _ in 0..24 {
            board.record_guess(&guess(ChordQuality::Major, 4)).unwrap();
        }
        let colors = board.render_colors();
        assert_eq!(colors[&4], palette.root);
        assert_eq!(colors[&8], palette.chord_tone);
        assert_eq!(colors[&6], palette.white_key);

        board.reset();
        assert_eq!(board.render_colors()[&4], palette.white_key);
    }

    #[tokio::test]
    async fn test_writer_publishes_colors_and_stats() {
        let state = AppState::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_feedback_writer(board(), rx, state.clone()));

        let played = Chord::new(ChordQuality::Major, 40);
        for _ in 0..24 {
            tx.send(GuessEvent {
                participant: Some(0),
                played: Some(played.clone()),
                guessed: Chord::new(ChordQuality::Major, 4),
            })
            .unwrap();
        }
        // off the board, still graded
        tx.send(GuessEvent {
            participant: None,
            played: Some(played),
            guessed: Chord::new(ChordQuality::Minor, 40),
        })
        .unwrap();
        drop(tx);
        writer.await.unwrap();

        let colors = state.key_colors.lock().unwrap();
        assert_eq!(colors[&4], Palette::default().root);
        let stats = state.stats.lock().unwrap();
        assert_eq!(stats.guesses(), 25);
        assert_eq!(stats.exact_rate(), Some(24.0 / 25.0));
    }

    #[test]
    fn test_color_lerp_clamps() {
        let c = Color::BLACK.lerp(Color::WHITE, 0.5);
        assert_eq!(c, Color::rgb(0.5, 0.5, 0.5));
        assert_eq!(Color::BLACK.lerp(Color::WHITE, 2.0), Color::WHITE);
        assert_eq!(Color::BLACK.lerp(Color::WHITE, -1.0), Color::BLACK);
    }
}
