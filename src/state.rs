use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::Voice;
use crate::feedback::Color;
use crate::score::TrainingStats;

/// Centralized state shared across the training tasks, audio, MIDI and UI.
#[derive(Debug)]
pub struct AppState {
    /// Feedback keyboard colours by piano key.
    pub key_colors: Mutex<BTreeMap<i32, Color>>,

    /// Voices currently sounding.
    pub voices: Mutex<Vec<Voice>>,

    /// Piano keys held down on the MIDI keyboard.
    pub held_keys: Mutex<BTreeSet<i32>>,

    /// Statistics over all graded guesses.
    pub stats: Mutex<TrainingStats>,

    /// A buffer to store audio waveform data for visualization.
    pub waveform_buffer: Mutex<Vec<f32>>,

    running: AtomicBool,
}

impl AppState {
    /// Create a new `AppState` with default values.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            key_colors: Mutex::new(BTreeMap::new()),
            voices: Mutex::new(Vec::new()),
            held_keys: Mutex::new(BTreeSet::new()),
            stats: Mutex::new(TrainingStats::new()),
            waveform_buffer: Mutex::new(vec![0.0; 1024]), // Initialize with 1024 samples
            running: AtomicBool::new(true),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Tells device threads to wind down.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
