//! Grading guesses and keeping training statistics.

use std::collections::BTreeMap;

use crate::chord::{Chord, ChordQuality};

/// Size of the exact-match history kept for plotting.
pub const HISTORY_LEN: usize = 1024;

/// How close a guess came to the played chord.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Grade {
    /// Same pitch content.
    Exact,
    QualityMatch,
    KeyMatch,
    Miss,
}

impl Grade {
    pub fn reward(self) -> f32 {
        match self {
            Grade::Exact => 1.0,
            Grade::QualityMatch | Grade::KeyMatch => 0.5,
            Grade::Miss => 0.0,
        }
    }

    pub fn quality_hit(self) -> bool {
        matches!(self, Grade::Exact | Grade::QualityMatch)
    }

    pub fn key_hit(self) -> bool {
        matches!(self, Grade::Exact | Grade::KeyMatch)
    }
}

/// Grades a guess. Full equivalence wins over a quality match, which wins
/// over a key match.
pub fn grade(played: &Chord, guessed: &Chord) -> Grade {
    if played.is_equivalent(guessed) {
        Grade::Exact
    } else if played.same_quality(guessed) {
        Grade::QualityMatch
    } else if played.same_key(guessed) {
        Grade::KeyMatch
    } else {
        Grade::Miss
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Running means of how well guesses match the played chords.
#[derive(Clone, Debug, Default)]
pub struct TrainingStats {
    by_quality: BTreeMap<ChordQuality, Mean>,
    quality: Mean,
    key: Mean,
    exact: Mean,
    total_reward: f64,
    history: Vec<f64>,
}

impl TrainingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, played: &Chord, grade: Grade) {
        let quality_hit = if grade.quality_hit() { 1.0 } else { 0.0 };
        self.by_quality
            .entry(played.quality())
            .or_default()
            .add(quality_hit);
        self.quality.add(quality_hit);
        self.key.add(if grade.key_hit() { 1.0 } else { 0.0 });
        self.exact.add(if grade == Grade::Exact { 1.0 } else { 0.0 });
        self.total_reward += grade.reward() as f64;

        if self.history.len() == HISTORY_LEN {
            self.history.remove(0);
        }
        self.history.push(self.exact.value().unwrap_or(0.0));
    }

    /// Named means: `ChordType/<Quality>`, `Chord/Type` and `Chord/Key`.
    pub fn summary(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for (quality, mean) in &self.by_quality {
            if let Some(v) = mean.value() {
                out.insert(format!("ChordType/{}", quality), v);
            }
        }
        if let Some(v) = self.quality.value() {
            out.insert("Chord/Type".to_string(), v);
        }
        if let Some(v) = self.key.value() {
            out.insert("Chord/Key".to_string(), v);
        }
        out
    }

    pub fn guesses(&self) -> u64 {
        self.exact.count()
    }

    pub fn exact_rate(&self) -> Option<f64> {
        self.exact.value()
    }

    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    /// Exact-match rate after each of the most recent guesses.
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}
