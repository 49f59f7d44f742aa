//! Sync engine
//!
//! Drives initialization and the poll loop. Cycles never overlap: a single
//! task owns the engine and runs them back to back, sleeping between them.
//! Cancellation only wakes sleeps; a running cycle is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CheckpointStore, CycleReport, EngineConfig, EngineState, Topology};
use crate::api::{AccessControlSource, EventWindow};
use crate::error::{Result, SyncError};
use crate::graph::{find_by_name, GraphPlatform};
use crate::mapper::{EntityMapper, MapperAnchors};

/// Event window for a stored checkpoint
pub fn window_for_checkpoint(last_sync_ms: i64) -> EventWindow {
    if last_sync_ms <= 0 {
        return EventWindow::Full;
    }
    match Utc.timestamp_millis_opt(last_sync_ms).single() {
        Some(at) => EventWindow::After(at),
        None => EventWindow::Full,
    }
}

/// Sleep for `duration` unless cancelled first. Returns false on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub struct SyncEngine<S: AccessControlSource, G: GraphPlatform, C: CheckpointStore> {
    config: EngineConfig,
    topology: Topology,
    source: Arc<S>,
    graph: Arc<G>,
    checkpoint: Arc<C>,
    mapper: Option<EntityMapper<G>>,
    state_tx: watch::Sender<EngineState>,
}

impl<S: AccessControlSource, G: GraphPlatform, C: CheckpointStore> SyncEngine<S, G, C> {
    pub fn new(
        config: EngineConfig,
        topology: Topology,
        source: Arc<S>,
        graph: Arc<G>,
        checkpoint: Arc<C>,
    ) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Uninitialized);
        Self {
            config,
            topology,
            source,
            graph,
            checkpoint,
            mapper: None,
            state_tx,
        }
    }

    /// Watch engine state transitions
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    pub fn mapper(&self) -> Option<&EntityMapper<G>> {
        self.mapper.as_ref()
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Engine state changed");
        }
    }

    async fn resolve_anchors(&self) -> Result<MapperAnchors> {
        let network = self
            .graph
            .find_context(&self.topology.network_context)
            .await?
            .ok_or_else(|| {
                SyncError::Provisioning(format!(
                    "network context {:?} not found",
                    self.topology.network_context
                ))
            })?;

        let children = self.graph.children(&network.id).await?;
        let virtual_network = find_by_name(&children, &self.topology.virtual_network)
            .ok_or_else(|| {
                SyncError::Provisioning(format!(
                    "virtual network {:?} not found in {:?}",
                    self.topology.virtual_network, self.topology.network_context
                ))
            })?
            .id
            .clone();

        let occupant_context = self
            .graph
            .ensure_occupant_context(&self.topology.occupant_context)
            .await?
            .id;

        Ok(MapperAnchors {
            virtual_network,
            occupant_context,
        })
    }

    /// Resolve graph anchors, seed occupants from badges and create missing
    /// devices from accesses.
    ///
    /// Missing anchors fail with [`SyncError::Provisioning`]. Safe to call
    /// again after a failure; the occupant index is rebuilt from scratch.
    pub async fn initialize(&mut self) -> Result<()> {
        self.set_state(EngineState::Initializing);
        info!("Initializing sync engine");

        let anchors = self.resolve_anchors().await?;
        info!(
            network = %self.topology.network_context,
            virtual_network = %self.topology.virtual_network,
            occupants = %self.topology.occupant_context,
            "Required graph nodes resolved"
        );

        let mut mapper = EntityMapper::new(Arc::clone(&self.graph), anchors);

        let badges = self.source.fetch_badges().await?;
        info!(count = badges.len(), "Fetched badges");
        mapper.reconcile_occupants(&badges).await?;

        let accesses = self.source.fetch_accesses().await?;
        info!(count = accesses.len(), "Fetched accesses");
        mapper.reconcile_devices(&accesses).await?;

        self.mapper = Some(mapper);
        self.set_state(EngineState::Idle);
        info!("Initialization complete");
        Ok(())
    }

    /// Run one poll cycle that started at `started_at`.
    ///
    /// On success the checkpoint becomes `started_at`. On failure the
    /// checkpoint is left alone and the engine enters `Backoff`.
    pub async fn run_cycle(&self, started_at: DateTime<Utc>) -> Result<CycleReport> {
        self.set_state(EngineState::Active);
        match self.poll(started_at).await {
            Ok(report) => {
                self.set_state(EngineState::Idle);
                Ok(report)
            }
            Err(e) => {
                self.set_state(EngineState::Backoff);
                Err(e)
            }
        }
    }

    async fn poll(&self, started_at: DateTime<Utc>) -> Result<CycleReport> {
        let mapper = self
            .mapper
            .as_ref()
            .ok_or_else(|| SyncError::Provisioning("sync engine is not initialized".to_string()))?;

        let window = window_for_checkpoint(self.checkpoint.load().await?);
        match &window {
            EventWindow::Full => info!("First sync, fetching full event history"),
            EventWindow::After(since) => info!(since = %since, "Incremental sync"),
        }

        let events = self.source.fetch_events(window).await?;
        let fetched = events.len();
        let events: Vec<_> = events.into_iter().filter(|e| e.unit.is_some()).collect();
        let without_unit = fetched - events.len();

        let projection = mapper.apply_events(&events).await?;

        if let Err(e) = self.checkpoint.store(started_at.timestamp_millis()).await {
            error!(error = %e, "Failed to persist checkpoint");
        }

        info!(
            fetched,
            without_unit,
            applied = projection.applied,
            gaps = projection.gaps.len(),
            "Sync cycle finished"
        );

        Ok(CycleReport {
            started_at,
            window,
            fetched,
            without_unit,
            projection,
        })
    }

    /// Initialize, then poll every `period` until `cancel` fires.
    ///
    /// Transient failures during initialization are retried after the error
    /// cooldown. Only unrecoverable errors are returned.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return self.stop();
            }
            match self.initialize().await {
                Ok(()) => break,
                Err(e) if !e.is_recoverable() => {
                    error!(error = %e, "Initialization failed");
                    self.set_state(EngineState::Stopped);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_ms = self.config.error_cooldown.as_millis() as u64,
                        "Initialization failed, retrying"
                    );
                    self.set_state(EngineState::Backoff);
                    if !pause(&cancel, self.config.error_cooldown).await {
                        return self.stop();
                    }
                }
            }
        }

        info!(period_ms = self.config.period.as_millis() as u64, "Starting poll loop");
        if !pause(&cancel, self.config.period).await {
            return self.stop();
        }

        while !cancel.is_cancelled() {
            let started = Instant::now();

            if let Err(e) = self.run_cycle(Utc::now()).await {
                if !e.is_recoverable() {
                    error!(error = %e, "Sync cycle failed, stopping");
                    self.set_state(EngineState::Stopped);
                    return Err(e);
                }
                error!(error = %e, "Sync cycle failed");
                if !pause(&cancel, self.config.error_cooldown).await {
                    break;
                }
                self.set_state(EngineState::Idle);
            }

            let remaining = self.config.period.saturating_sub(started.elapsed());
            if !pause(&cancel, remaining).await {
                break;
            }
        }

        self.stop()
    }

    fn stop(&self) -> Result<()> {
        self.set_state(EngineState::Stopped);
        info!("Sync engine stopped");
        Ok(())
    }
}
