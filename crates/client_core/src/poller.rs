use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

use crate::{transport::DeviceBackend, LinkSupervisor};

/// Runs the status poll loop for one activation. The first query fires
/// immediately, later ones once per interval. Queries never overlap: the loop
/// awaits each one, and ticks that elapse while a query is still running are
/// skipped rather than queued.
///
/// The task carries the generation it was spawned under; `apply_snapshot`
/// drops results from generations that are no longer active, so a query that
/// resolves after deactivation cannot mutate supervisor state.
pub(crate) fn spawn(
    supervisor: Arc<LinkSupervisor>,
    backend: Arc<dyn DeviceBackend>,
    interval: Duration,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            match backend.fetch_status().await {
                Ok(status) => supervisor.apply_snapshot(generation, status).await,
                Err(err) => {
                    // Transient by assumption; subscribers keep the last
                    // snapshot and the next tick retries.
                    debug!(error = %err, "status poll failed");
                }
            }
        }
    })
}
