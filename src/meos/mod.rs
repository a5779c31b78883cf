//! Reconciliation engine for the live MeOS upstream
//!
//! Polls the MOP endpoint with a difference cursor, decodes the
//! envelope, merges it into the running collections and publishes the
//! result through the state store's single write path. A failed cycle
//! leaves the cursor untouched so the next tick retries from the same
//! baseline; nothing here is fatal to the process.

pub mod convert;
pub mod protocol;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::adapter::SourceAdapter;
use crate::config::MeosConfig;
use crate::error::{Error, Result};
use crate::state::State;

use protocol::MopKind;

const INITIAL_CURSOR: &str = "zero";
const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared by the adapter handle and its polling task.
struct Core {
    client: reqwest::Client,
    config: MeosConfig,
    state: Arc<State>,
    cursor: Mutex<String>,
}

impl Core {
    /// One fetch-and-reconcile cycle. Returns whether an update was
    /// merged (`false` when the cursor already matched).
    async fn fetch_and_process(&self, difference: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.config.endpoint())
            .query(&[("difference", difference)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        self.process_data(&body)
    }

    fn process_data(&self, xml: &str) -> Result<bool> {
        let document = protocol::parse_document(xml)?;

        {
            let mut cursor = self.cursor.lock().unwrap();
            if document.next_difference == *cursor {
                // Deliberate no-op: the upstream has nothing newer.
                return Ok(false);
            }
            debug!(
                from = %cursor,
                to = %document.next_difference,
                "processing MeOS data update"
            );
            *cursor = document.next_difference.clone();
        }

        let complete = document.kind == MopKind::Complete;
        if complete {
            info!(
                controls = document.controls.len(),
                classes = document.classes.len(),
                clubs = document.organizations.len(),
                competitors = document.competitors.len(),
                "received MOPComplete"
            );
        } else {
            debug!(
                controls = document.controls.len(),
                classes = document.classes.len(),
                clubs = document.organizations.len(),
                competitors = document.competitors.len(),
                "received MOPDiff"
            );
        }

        // Merge the competition first; decisecond offsets in the same
        // envelope are relative to its zero time.
        let event = convert::merge_event(self.state.event(), &document);

        let new_controls = convert::convert_controls(&document.controls);
        let new_classes = convert::convert_classes(&document.classes);
        let new_clubs = convert::convert_clubs(&document.organizations);
        let new_competitors = convert::convert_competitors(&document.competitors, Some(&event));

        let controls = convert::upsert(&self.state.controls(), new_controls, complete);
        let clubs = convert::upsert(&self.state.clubs(), new_clubs, complete);
        let mut classes = convert::upsert(&self.state.classes(), new_classes, complete);
        let mut competitors = convert::upsert(&self.state.competitors(), new_competitors, complete);

        convert::resolve_references(&mut classes, &mut competitors, &controls, &clubs);

        self.state
            .update_from_meos(Some(event), controls, classes, clubs, competitors);

        Ok(true)
    }
}

/// Producer that reconciles the live MOP feed into the state store.
pub struct MeosAdapter {
    core: Arc<Core>,
    connected: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl MeosAdapter {
    pub fn new(config: MeosConfig, state: Arc<State>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(MeosAdapter {
            core: Arc::new(Core {
                client,
                config,
                state,
                cursor: Mutex::new(INITIAL_CURSOR.to_string()),
            }),
            connected: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
        })
    }
}

#[async_trait]
impl SourceAdapter for MeosAdapter {
    async fn connect(&self) -> Result<()> {
        let difference = self.core.cursor.lock().unwrap().clone();
        self.core.fetch_and_process(&difference).await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start_polling(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        let mut stop_slot = self.stop_tx.lock().unwrap();
        if stop_slot.is_some() {
            debug!("polling already running");
            return Ok(());
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        *stop_slot = Some(stop_tx);

        let core = self.core.clone();
        let poll_interval = core.config.poll_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(poll_interval);
            // The first tick of a tokio interval fires immediately.
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        debug!("polling loop stopping");
                        return;
                    }
                    _ = tick.tick() => {
                        let difference = core.cursor.lock().unwrap().clone();
                        match core.fetch_and_process(&difference).await {
                            Ok(true) => {
                                debug!(cursor = %difference, "data updated from MeOS");
                            }
                            Ok(false) => {}
                            Err(e) => {
                                error!("error fetching/processing data: {e}");
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            let _ = stop_tx.send(true);
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}
