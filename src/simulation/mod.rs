//! Simulation producer
//!
//! Drop-in alternative to the live upstream adapter: seeds the state
//! store with a generated roster and then drives the same publish path
//! on a fixed short tick, independent of the configured phase
//! durations.

mod generator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::adapter::SourceAdapter;
use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::state::State;

use generator::Generator;

/// Tick rate for smooth progress, independent of phase durations.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

pub struct SimulationAdapter {
    state: Arc<State>,
    generator: Arc<Mutex<Generator>>,
    connected: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl SimulationAdapter {
    pub fn new(config: SimulationConfig, state: Arc<State>) -> Self {
        SimulationAdapter {
            state,
            generator: Arc::new(Mutex::new(Generator::new(config))),
            connected: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
        }
    }

    /// Current phase name and time until the next phase, when running.
    pub fn status(&self) -> Option<(&'static str, chrono::Duration)> {
        if !self.connected.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.generator.lock().unwrap().current_phase())
    }
}

#[async_trait]
impl SourceAdapter for SimulationAdapter {
    async fn connect(&self) -> Result<()> {
        info!("starting simulation mode");

        let base_time = Utc::now();
        let (event, controls, classes, clubs, competitors) = self
            .generator
            .lock()
            .unwrap()
            .generate_initial(base_time);

        info!(
            classes = classes.len(),
            competitors = competitors.len(),
            "simulation initialized"
        );

        // Multi-field atomic seed outside the change-detecting path.
        {
            let mut state = self.state.lock();
            state.event = Some(event);
            state.controls = controls;
            state.classes = classes;
            state.clubs = clubs;
            state.competitors = competitors;
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start_polling(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        let mut stop_slot = self.stop_tx.lock().unwrap();
        if stop_slot.is_some() {
            debug!("simulation updates already running");
            return Ok(());
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        *stop_slot = Some(stop_tx);

        let state = self.state.clone();
        let generator = self.generator.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(TICK_INTERVAL);
            let mut last_phase = "";

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        debug!("simulation loop stopping");
                        return;
                    }
                    _ = tick.tick() => {
                        let now = Utc::now();
                        let (competitors, phase) = {
                            let mut generator = generator.lock().unwrap();
                            let competitors = generator.update(now);
                            (competitors, generator.current_phase().0)
                        };

                        state.update_from_meos(
                            state.event(),
                            state.controls(),
                            state.classes(),
                            state.clubs(),
                            competitors,
                        );

                        if phase != last_phase {
                            debug!(phase, "simulation phase change");
                            last_phase = phase;
                        }
                    }
                }
            }
        });

        info!("started simulation updates");
        Ok(())
    }

    fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            let _ = stop_tx.send(true);
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}
