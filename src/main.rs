use std::sync::{Arc, PoisonError};

use chord_trainer::audio::{run_playback_engine, SynthPlayback};
use chord_trainer::coordinator::{Round, RoundCoordinator};
use chord_trainer::error::TrainerError;
use chord_trainer::feedback::{run_feedback_writer, FeedbackBoard, Palette};
use chord_trainer::midi::run_midi_listener;
use chord_trainer::participant::run_agent;
use chord_trainer::playback::{LogPlayback, Playback};
use chord_trainer::state::AppState;
use chord_trainer::ui::run_ui;
use chord_trainer::Config;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), TrainerError> {
    config.validate()?;
    let state = AppState::new();

    let playback: Arc<dyn Playback> = if config.no_audio {
        Arc::new(LogPlayback)
    } else {
        let engine_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_playback_engine(engine_state).await {
                error!("Audio engine stopped: {}", e);
            }
        });
        Arc::new(SynthPlayback::new(state.clone(), config.note_duration as f32))
    };

    let coordinator = Arc::new(RoundCoordinator::new(playback, config.rng(0)));
    let (guess_tx, guess_rx) = mpsc::unbounded_channel();
    let board = FeedbackBoard::new(
        config.board_keys(),
        config.feedback_params(),
        Palette::default(),
    );
    let writer = tokio::spawn(run_feedback_writer(board, guess_rx, state.clone()));

    if let Some(port) = config.midi_port {
        let (midi_state, rounds, guesses) =
            (state.clone(), coordinator.subscribe(), guess_tx.clone());
        tokio::spawn(async move {
            if let Err(e) = run_midi_listener(port, midi_state, rounds, guesses).await {
                error!("MIDI listener stopped: {}", e);
            }
        });
    }

    // Everyone registers before anyone reports ready, so the first round
    // waits for the whole group.
    let participants: Vec<_> = (0..config.participants)
        .map(|_| coordinator.register())
        .collect();
    let mut agents = Vec::with_capacity(participants.len());
    for participant in participants {
        let id = participant.id();
        let policy = config.policy(id as u64 + 1);
        let (coordinator, guesses, pacing) =
            (coordinator.clone(), guess_tx.clone(), config.pacing());
        agents.push(tokio::spawn(async move {
            if let Err(e) = run_agent(coordinator, participant, policy, pacing, guesses).await {
                error!("Participant {} stopped: {}", id, e);
            }
        }));
    }
    drop(guess_tx);
    info!("Started {} participants", agents.len());

    let rounds = coordinator.subscribe();
    let result = if config.no_ui {
        wait_for_rounds(rounds, config.rounds).await;
        Ok(())
    } else {
        let ui_state = state.clone();
        tokio::task::block_in_place(move || run_ui(ui_state, rounds))
    };

    state.stop();
    for agent in &agents {
        agent.abort();
    }
    if let Err(e) = writer.await {
        error!("Feedback writer failed: {}", e);
    }

    info!("{} rounds played", coordinator.rounds_completed());
    let summary = state
        .stats
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .summary();
    for (name, value) in summary {
        info!("{}: {:.3}", name, value);
    }
    result
}

/// Returns once `limit` rounds have been dispatched or on Ctrl-C.
async fn wait_for_rounds(mut rounds: watch::Receiver<Option<Round>>, limit: Option<u64>) {
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                info!("Interrupted");
                return;
            }
            changed = rounds.changed() => {
                if changed.is_err() {
                    return;
                }
                let number = rounds.borrow_and_update().as_ref().map_or(0, |r| r.number);
                if limit.is_some_and(|limit| number >= limit) {
                    info!("Reached {} rounds", number);
                    return;
                }
            }
        }
    }
}
