//! Auto-escalation sweeper
//!
//! Periodically scans pending steps whose auto-approval deadline has
//! passed and forces them through the engine as the system actor. The
//! sweep shares the engine's compare-and-set path, so a human approving
//! at the same moment resolves to one winner; the loser is logged and
//! skipped, never double-applied.

use crate::directory::OrgDirectory;
use crate::error::EngineError;
use crate::workflow::engine::RequestEngine;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Background task escalating steps past their deadline
pub struct EscalationSweeper<D: OrgDirectory> {
    engine: Arc<RequestEngine<D>>,
    interval: Duration,
}

impl<D: OrgDirectory + 'static> EscalationSweeper<D> {
    pub fn new(engine: Arc<RequestEngine<D>>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run the sweep loop forever
    pub async fn start(self: Arc<Self>) {
        log::info!(
            "Starting auto-escalation sweeper (interval: {}s)",
            self.interval.as_secs()
        );

        loop {
            let escalated = self.sweep_once().await;
            if escalated > 0 {
                log::info!("Escalation sweep auto-approved {} steps", escalated);
            }
            sleep(self.interval).await;
        }
    }

    /// Scan all pending requests once; returns the number of steps
    /// escalated
    pub async fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let mut escalated = 0;

        for request in self.engine.pending_requests() {
            let Some(step) = request.active_step() else {
                continue;
            };

            let Some(deadline) = step.auto_approve_deadline() else {
                continue;
            };

            if now < deadline {
                continue;
            }

            let days = step.auto_approve_after_days.unwrap_or(0);
            let comment = format!("Auto-approved after {} days without action", days);

            match self
                .engine
                .auto_approve(&request.id, step.order, comment)
                .await
            {
                Ok(_) => {
                    escalated += 1;
                    log::info!(
                        "Auto-approved step {} of request {} ({} past deadline)",
                        step.order,
                        request.id,
                        request.activity_type
                    );
                }
                Err(EngineError::Conflict(reason)) => {
                    // Someone actioned the step between the scan and the CAS
                    log::debug!(
                        "Escalation of request {} step {} lost the race: {}",
                        request.id,
                        step.order,
                        reason
                    );
                }
                Err(EngineError::Handler(reason)) => {
                    // The step was escalated; the domain callback failure
                    // must be reconciled by the domain module
                    escalated += 1;
                    log::error!("Escalation handler failure: {}", reason);
                }
                Err(e) => {
                    log::error!(
                        "Failed to escalate request {} step {}: {}",
                        request.id,
                        step.order,
                        e
                    );
                }
            }
        }

        escalated
    }
}
