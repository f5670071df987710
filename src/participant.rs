//! Participants: the coordinator's view of a player, and the agent loop that
//! drives one through rounds and episodes.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::chord::{Chord, ChordQuality};
use crate::coordinator::{Round, RoundCoordinator};
use crate::error::TrainerError;
use crate::feedback::GuessEvent;
use crate::score::grade;

pub type ParticipantId = usize;

/// A registered participant's handle: its id and incoming rounds.
#[derive(Debug)]
pub struct Participant {
    id: ParticipantId,
    rounds: mpsc::UnboundedReceiver<Round>,
}

impl Participant {
    pub(crate) fn new(id: ParticipantId, rounds: mpsc::UnboundedReceiver<Round>) -> Self {
        Self { id, rounds }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Waits for the next broadcast round. `None` once the coordinator is gone.
    pub async fn next_round(&mut self) -> Option<Round> {
        self.rounds.recv().await
    }

    pub fn try_next_round(&mut self) -> Option<Round> {
        self.rounds.try_recv().ok()
    }
}

/// Decides what to answer for a round.
///
/// The answer is a quality plus a root pitch class (0..12), the same shape an
/// external decision component produces.
pub trait GuessPolicy: Send {
    fn decide(&mut self, round: &Round) -> (ChordQuality, i32);
}

/// Guesses uniformly at random.
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl GuessPolicy for RandomPolicy {
    fn decide(&mut self, _round: &Round) -> (ChordQuality, i32) {
        (ChordQuality::random(&mut self.rng), self.rng.gen_range(0..12))
    }
}

/// Knows the answer, but only gives it with probability `accuracy`.
pub struct NoisyOraclePolicy {
    rng: StdRng,
    accuracy: f64,
}

impl NoisyOraclePolicy {
    pub fn new(rng: StdRng, accuracy: f64) -> Self {
        Self {
            rng,
            accuracy: accuracy.clamp(0.0, 1.0),
        }
    }
}

impl GuessPolicy for NoisyOraclePolicy {
    fn decide(&mut self, round: &Round) -> (ChordQuality, i32) {
        if self.rng.gen_bool(self.accuracy) {
            (round.chord().quality(), round.chord().key())
        } else {
            (ChordQuality::random(&mut self.rng), self.rng.gen_range(0..12))
        }
    }
}

/// Timing of an agent's rounds and episodes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pacing {
    /// Decisions per episode.
    pub episode_length: u32,
    /// Wait after a decision before reporting ready again.
    pub pause: Duration,
    /// Wait at the start of each episode.
    pub episode_delay: Duration,
    /// How long the chord is listened to before deciding.
    pub listen: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            episode_length: 100,
            pause: Duration::ZERO,
            episode_delay: Duration::from_millis(250),
            listen: Duration::from_millis(480),
        }
    }
}

/// Drives one participant until its round channel closes.
///
/// Every guess goes to `guesses`, the feedback path. On error the participant
/// leaves the coordinator so the others keep playing.
pub async fn run_agent(
    coordinator: Arc<RoundCoordinator>,
    participant: Participant,
    policy: Box<dyn GuessPolicy>,
    pacing: Pacing,
    guesses: mpsc::UnboundedSender<GuessEvent>,
) -> Result<(), TrainerError> {
    let id = participant.id();
    let result = play_rounds(&coordinator, participant, policy, pacing, guesses).await;
    if let Err(e) = &result {
        warn!("Participant {} failed: {}", id, e);
        if let Err(e) = coordinator.unregister(id) {
            debug!("Participant {} already gone: {}", id, e);
        }
    }
    result
}

async fn play_rounds(
    coordinator: &RoundCoordinator,
    mut participant: Participant,
    mut policy: Box<dyn GuessPolicy>,
    pacing: Pacing,
    guesses: mpsc::UnboundedSender<GuessEvent>,
) -> Result<(), TrainerError> {
    let id = participant.id();
    let mut decisions = 0;
    let mut episode_reward = 0.0;

    sleep(pacing.episode_delay).await;
    coordinator.notify_ready(id)?;

    while let Some(round) = participant.next_round().await {
        sleep(pacing.listen).await;

        let (quality, key) = policy.decide(&round);
        let guessed = Chord::new(quality, key);
        let result = grade(round.chord(), &guessed);
        episode_reward += result.reward();
        debug!(
            "Participant {} guessed {} for round {}: {:?}",
            id, guessed, round.number, result
        );

        guesses
            .send(GuessEvent {
                participant: Some(id),
                played: Some(round.chord().clone()),
                guessed,
            })
            .map_err(|_| TrainerError::ChannelClosed("feedback".to_string()))?;

        decisions += 1;
        if decisions == pacing.episode_length {
            info!(
                "Participant {} finished an episode, reward {:.1}",
                id, episode_reward
            );
            decisions = 0;
            episode_reward = 0.0;
            sleep(pacing.episode_delay).await;
        } else {
            sleep(pacing.pause).await;
        }
        coordinator.notify_ready(id)?;
    }

    debug!("Participant {} stopped", id);
    Ok(())
}
