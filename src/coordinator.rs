//! Keeps any number of participants in lock-step. Every participant reports
//! ready once per round; the last one to arrive triggers the next round:
//!
//! 1. the readiness set is cleared
//! 2. a [`Stimulus`] is drawn (instrument, root, quality, inversion, bass, drums)
//! 3. the [`Round`] is sent to every participant over its own channel and
//!    published as the latest round
//! 4. the stimulus is handed to the [`Playback`] collaborator
//!
//! Steps 1-3 run inside one critical section, so a round is dispatched exactly
//! once no matter how many tasks report ready concurrently, and the published
//! round never goes backwards. Participants whose handle was dropped are
//! removed before the barrier is checked. A live participant that never
//! reports ready stalls the round for everyone.
//!
//! Registration takes the same lock, so it can never interleave with a
//! dispatch. A participant registered mid-round joins the current barrier and
//! must report ready before the round can start.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::chord::{Chord, ChordQuality};
use crate::error::TrainerError;
use crate::instrument::{bass_key, Instrument};
use crate::participant::{Participant, ParticipantId};
use crate::playback::{
    Playback, PlaybackRequest, Sound, BASS_VOLUME, CHORD_VOLUME, PERCUSSION_VOLUME,
};

/// Everything chosen for one round.
#[derive(Clone, Debug, PartialEq)]
pub struct Stimulus {
    pub instrument: Instrument,
    pub chord: Chord,
    /// Bass key to play under the chord, if any.
    pub bass: Option<i32>,
    pub percussion: bool,
}

impl Stimulus {
    /// Draws a new stimulus. Every choice is an independent uniform draw.
    pub fn select<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let instrument = Instrument::random(rng);
        let root_key = instrument.random_root(rng);
        let quality = ChordQuality::random(rng);
        let chord = Chord::new(quality, root_key).random_inversion(rng);

        let bass = rng.gen_bool(0.5).then(|| bass_key(root_key));
        let percussion = rng.gen_bool(0.5);

        Self {
            instrument,
            chord,
            bass,
            percussion,
        }
    }

    /// One request per chord note, then the optional bass and drum loop.
    pub fn playback_requests(&self) -> Vec<PlaybackRequest> {
        let mut requests: Vec<PlaybackRequest> = self
            .chord
            .piano_keys()
            .map(|key| PlaybackRequest {
                sound: Sound::Melodic(self.instrument),
                pitch: Some(key),
                volume: CHORD_VOLUME,
            })
            .collect();

        if let Some(key) = self.bass {
            requests.push(PlaybackRequest {
                sound: Sound::Bass,
                pitch: Some(key),
                volume: BASS_VOLUME,
            });
        }
        if self.percussion {
            requests.push(PlaybackRequest {
                sound: Sound::Percussion,
                pitch: None,
                volume: PERCUSSION_VOLUME,
            });
        }
        requests
    }
}

/// A dispatched round, as broadcast to participants.
#[derive(Clone, Debug, PartialEq)]
pub struct Round {
    /// 1 for the first round.
    pub number: u64,
    pub stimulus: Stimulus,
}

impl Round {
    pub fn chord(&self) -> &Chord {
        &self.stimulus.chord
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nobody registered.
    Idle,
    /// Collecting ready signals.
    AwaitingReady,
    /// Selecting and broadcasting; only seen from inside the critical section.
    Dispatching,
}

struct Barrier {
    phase: Phase,
    participants: BTreeMap<ParticipantId, mpsc::UnboundedSender<Round>>,
    ready: BTreeSet<ParticipantId>,
    next_id: ParticipantId,
    round: u64,
    rng: StdRng,
}

pub struct RoundCoordinator {
    barrier: Mutex<Barrier>,
    playback: Arc<dyn Playback>,
    rounds: watch::Sender<Option<Round>>,
}

impl RoundCoordinator {
    pub fn new(playback: Arc<dyn Playback>, rng: StdRng) -> Self {
        let (rounds, _) = watch::channel(None);
        Self {
            barrier: Mutex::new(Barrier {
                phase: Phase::Idle,
                participants: BTreeMap::new(),
                ready: BTreeSet::new(),
                next_id: 0,
                round: 0,
                rng,
            }),
            playback,
            rounds,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Barrier> {
        self.barrier.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a participant and hands back its round channel.
    pub fn register(&self) -> Participant {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut barrier = self.lock();
        let id = barrier.next_id;
        barrier.next_id += 1;
        barrier.participants.insert(id, tx);
        barrier.phase = Phase::AwaitingReady;
        info!(
            "Registered participant {} ({} total)",
            id,
            barrier.participants.len()
        );
        Participant::new(id, rx)
    }

    /// Removes a participant. If everyone left is already ready, the next
    /// round is dispatched.
    pub fn unregister(&self, id: ParticipantId) -> Result<Option<Round>, TrainerError> {
        let mut barrier = self.lock();
        if barrier.participants.remove(&id).is_none() {
            return Err(TrainerError::UnknownParticipant(id));
        }
        barrier.ready.remove(&id);
        info!(
            "Unregistered participant {} ({} left)",
            id,
            barrier.participants.len()
        );
        self.release_if_complete(barrier)
    }

    /// Records that a participant is ready for the next round.
    ///
    /// Returns the round this call dispatched, if it was the last one missing.
    pub fn notify_ready(&self, id: ParticipantId) -> Result<Option<Round>, TrainerError> {
        let mut barrier = self.lock();
        if !barrier.participants.contains_key(&id) {
            return Err(TrainerError::UnknownParticipant(id));
        }
        if !barrier.ready.insert(id) {
            return Err(TrainerError::DuplicateReady(id));
        }
        debug!(
            "Participant {} ready ({}/{})",
            id,
            barrier.ready.len(),
            barrier.participants.len()
        );
        self.release_if_complete(barrier)
    }

    fn release_if_complete(
        &self,
        mut barrier: MutexGuard<'_, Barrier>,
    ) -> Result<Option<Round>, TrainerError> {
        prune_closed(&mut barrier);
        if barrier.participants.is_empty() {
            barrier.phase = Phase::Idle;
            return Ok(None);
        }
        if barrier.ready.len() < barrier.participants.len() {
            return Ok(None);
        }

        barrier.phase = Phase::Dispatching;
        barrier.ready.clear();
        barrier.round += 1;
        let round = Round {
            number: barrier.round,
            stimulus: Stimulus::select(&mut barrier.rng),
        };
        info!("Round {}: {} on {}", round.number, round.chord(), round.stimulus.instrument);

        self.rounds.send_replace(Some(round.clone()));
        for tx in barrier.participants.values() {
            // closed channels are pruned right below
            let _ = tx.send(round.clone());
        }
        prune_closed(&mut barrier);
        barrier.phase = if barrier.participants.is_empty() {
            Phase::Idle
        } else {
            Phase::AwaitingReady
        };
        drop(barrier);

        self.play(&round.stimulus);
        Ok(Some(round))
    }

    fn play(&self, stimulus: &Stimulus) {
        for request in stimulus.playback_requests() {
            if let Err(e) = self.playback.schedule(request) {
                warn!("Dropped playback request: {}", e);
            }
        }
    }

    pub fn participant_count(&self) -> usize {
        self.lock().participants.len()
    }

    pub fn ready_count(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of rounds dispatched so far.
    pub fn rounds_completed(&self) -> u64 {
        self.lock().round
    }

    /// Watches the most recently dispatched round.
    pub fn subscribe(&self) -> watch::Receiver<Option<Round>> {
        self.rounds.subscribe()
    }
}

/// Removes participants whose round channel is closed.
fn prune_closed(barrier: &mut Barrier) {
    let gone: Vec<ParticipantId> = barrier
        .participants
        .iter()
        .filter(|(_, tx)| tx.is_closed())
        .map(|(&id, _)| id)
        .collect();
    for id in gone {
        warn!("Participant {} stopped listening, removing it", id);
        barrier.participants.remove(&id);
        barrier.ready.remove(&id);
    }
}
