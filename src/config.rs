//! Command line configuration. Everything here is set once at startup.

use std::ops::RangeInclusive;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::TrainerError;
use crate::feedback::FeedbackParams;
use crate::participant::{GuessPolicy, NoisyOraclePolicy, Pacing, RandomPolicy};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Uniformly random guesses.
    Random,
    /// Knows the answer, gives it with `--oracle-accuracy`.
    Oracle,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "chord-trainer", about = "Chord recognition rounds for any number of players")]
pub struct Config {
    /// Number of simulated players.
    #[arg(short, long, default_value_t = 4)]
    pub participants: usize,

    #[arg(long, value_enum, default_value_t = PolicyKind::Oracle)]
    pub policy: PolicyKind,

    #[arg(long, default_value_t = 0.7)]
    pub oracle_accuracy: f64,

    /// Decisions per episode.
    #[arg(long, default_value_t = 100)]
    pub episode_length: u32,

    /// Seconds to wait between decisions (0 to 1).
    #[arg(long, default_value_t = 0.0)]
    pub pause_duration: f64,

    /// Seconds to wait when an episode starts.
    #[arg(long, default_value_t = 0.25)]
    pub episode_delay: f64,

    /// Seconds each chord sounds.
    #[arg(long, default_value_t = 0.48)]
    pub note_duration: f64,

    #[arg(long, default_value_t = 24)]
    pub max_count: u32,

    #[arg(long, default_value_t = 4)]
    pub threshold: u32,

    #[arg(long, default_value_t = 1.0)]
    pub exponent: f32,

    /// Lowest key of the feedback keyboard.
    #[arg(long, default_value_t = 4)]
    pub first_key: i32,

    /// Highest key of the feedback keyboard.
    #[arg(long, default_value_t = 27)]
    pub last_key: i32,

    /// Seed for reproducible runs.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many rounds.
    #[arg(long)]
    pub rounds: Option<u64>,

    #[arg(long)]
    pub no_audio: bool,

    /// Run without a window.
    #[arg(long)]
    pub no_ui: bool,

    /// MIDI input port to take guesses from.
    #[arg(long)]
    pub midi_port: Option<usize>,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn validate(&self) -> Result<(), TrainerError> {
        let fail = |msg: &str| Err(TrainerError::InvalidConfig(msg.to_string()));
        if self.participants == 0 {
            return fail("at least one participant is needed");
        }
        if self.threshold >= self.max_count {
            return fail("threshold must be below max-count");
        }
        if !(self.exponent > 0.0) {
            return fail("exponent must be positive");
        }
        if !(0.0..=1.0).contains(&self.pause_duration) {
            return fail("pause-duration must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&self.oracle_accuracy) {
            return fail("oracle-accuracy must be between 0 and 1");
        }
        if !(self.episode_delay.is_finite() && self.episode_delay >= 0.0) {
            return fail("episode-delay must be a non-negative number of seconds");
        }
        if !(self.note_duration.is_finite() && self.note_duration > 0.0) {
            return fail("note-duration must be a positive number of seconds");
        }
        if self.episode_length == 0 {
            return fail("episode-length must be positive");
        }
        if self.first_key > self.last_key {
            return fail("first-key must not be above last-key");
        }
        Ok(())
    }

    pub fn feedback_params(&self) -> FeedbackParams {
        FeedbackParams {
            max_count: self.max_count,
            threshold: self.threshold,
            exponent: self.exponent,
        }
    }

    pub fn board_keys(&self) -> RangeInclusive<i32> {
        self.first_key..=self.last_key
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            episode_length: self.episode_length,
            pause: millis(self.pause_duration),
            episode_delay: millis(self.episode_delay),
            listen: millis(self.note_duration),
        }
    }

    /// Random source for one consumer. Seeded runs give each stream its own
    /// seed so they stay independent.
    pub fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }

    pub fn policy(&self, stream: u64) -> Box<dyn GuessPolicy> {
        match self.policy {
            PolicyKind::Random => Box::new(RandomPolicy::new(self.rng(stream))),
            PolicyKind::Oracle => Box::new(NoisyOraclePolicy::new(
                self.rng(stream),
                self.oracle_accuracy,
            )),
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

/// Seconds to a whole number of milliseconds. Expects a validated value.
fn millis(seconds: f64) -> Duration {
    Duration::from_millis((seconds * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("chord-trainer").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.participants, 4);
        assert_eq!(config.policy, PolicyKind::Oracle);
        assert_eq!(config.feedback_params(), FeedbackParams::default());
        assert_eq!(config.board_keys(), 4..=27);
        assert_eq!(config.pacing(), Pacing::default());
        assert_eq!(config.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_flags() {
        let config = parse(&["-p", "2", "--policy", "random", "--seed", "5", "--no-ui", "-vv"]);
        assert_eq!(config.participants, 2);
        assert_eq!(config.policy, PolicyKind::Random);
        assert_eq!(config.seed, Some(5));
        assert!(config.no_ui);
        assert_eq!(config.log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_validation() {
        assert!(parse(&["--threshold", "24"]).validate().is_err());
        assert!(parse(&["--exponent", "0"]).validate().is_err());
        assert!(parse(&["--participants", "0"]).validate().is_err());
        assert!(parse(&["--pause-duration", "1.5"]).validate().is_err());
        assert!(parse(&["--first-key", "30"]).validate().is_err());
        assert!(parse(&["--oracle-accuracy", "2"]).validate().is_err());
        assert!(parse(&["--note-duration", "0"]).validate().is_err());
        assert!(parse(&["--episode-delay=-1"]).validate().is_err());
    }

    #[test]
    fn test_non_finite_durations_are_rejected() {
        assert!(parse(&["--note-duration", "inf"]).validate().is_err());
        assert!(parse(&["--note-duration", "NaN"]).validate().is_err());
        assert!(parse(&["--episode-delay", "inf"]).validate().is_err());
        assert!(parse(&["--pause-duration", "NaN"]).validate().is_err());
    }

    #[test]
    fn test_durations_in_whole_milliseconds() {
        let pacing = parse(&["--note-duration", "0.48", "--pause-duration", "0.1"]).pacing();
        assert_eq!(pacing.listen, Duration::from_millis(480));
        assert_eq!(pacing.pause, Duration::from_millis(100));
        assert_eq!(pacing.episode_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_seeded_rngs_repeat() {
        use rand::Rng;
        let config = parse(&["--seed", "42"]);
        let a: u64 = config.rng(1).gen();
        let b: u64 = config.rng(1).gen();
        let c: u64 = config.rng(2).gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
