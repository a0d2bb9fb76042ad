//! Approval engine daemon
//!
//! Hosts the engine and its auto-escalation sweeper. Domain modules and
//! any API framing live in the embedding platform; this process registers
//! audit-logging handlers for the configured activity types so the engine
//! always has a completion callback to notify.

use anyhow::Context;
use approval_core::workflow::handlers::ActivityHandler;
use approval_core::{
    EngineConfig, EscalationSweeper, HandlerRegistry, RequestEngine, RequestStore, Result,
    StaticDirectory, TemplateStore,
};
use approval_types::{ActivityId, ActivityType, PersonId};
use async_trait::async_trait;
use clap::{Arg, Command};
use std::sync::Arc;
use tokio::time::Duration;

/// Logs every terminal transition for the audit trail
struct AuditHandler {
    activity_type: ActivityType,
}

impl AuditHandler {
    fn new(activity_type: ActivityType) -> Self {
        Self { activity_type }
    }
}

#[async_trait]
impl ActivityHandler for AuditHandler {
    async fn on_approved(&self, activity_id: &ActivityId, approved_by: &PersonId) -> Result<()> {
        log::info!(
            "[{}] activity {} approved by {}",
            self.activity_type,
            activity_id,
            approved_by
        );
        Ok(())
    }

    async fn on_rejected(
        &self,
        activity_id: &ActivityId,
        rejected_by: &PersonId,
        reason: &str,
    ) -> Result<()> {
        log::info!(
            "[{}] activity {} rejected by {}: {}",
            self.activity_type,
            activity_id,
            rejected_by,
            reason
        );
        Ok(())
    }

    async fn on_cancelled(
        &self,
        activity_id: &ActivityId,
        cancelled_by: &PersonId,
        reason: Option<&str>,
    ) -> Result<()> {
        log::info!(
            "[{}] activity {} cancelled by {}{}",
            self.activity_type,
            activity_id,
            cancelled_by,
            reason.map(|r| format!(": {}", r)).unwrap_or_default()
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("approval-server")
        .version("1.0.0")
        .about("Approval workflow engine daemon")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/app/config/engine.json"),
        )
        .arg(
            Arg::new("sweep-interval")
                .long("sweep-interval")
                .value_name("SECONDS")
                .help("Override the auto-escalation sweep interval"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = EngineConfig::from_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    log::info!("Loaded configuration from {}", config_path);

    let sweep_interval = match matches.get_one::<String>("sweep-interval") {
        Some(raw) => raw
            .parse::<u64>()
            .context("Invalid --sweep-interval value")?,
        None => config.sweep_interval_secs,
    };

    let directory = Arc::new(StaticDirectory::from_config(&config));
    let templates = Arc::new(TemplateStore::new());
    let store = Arc::new(RequestStore::new());
    let registry = Arc::new(HandlerRegistry::new());

    for raw_type in &config.activity_types {
        let activity_type = ActivityType::new(raw_type.clone());
        registry.register(
            activity_type.clone(),
            Arc::new(AuditHandler::new(activity_type)),
        );
    }

    let engine = Arc::new(RequestEngine::new(
        templates,
        store,
        registry,
        directory,
        PersonId::new(config.system_actor.clone()),
    ));

    log::info!("Initialized approval engine for {} activity types", config.activity_types.len());

    let sweeper = Arc::new(EscalationSweeper::new(
        engine,
        Duration::from_secs(sweep_interval),
    ));

    let sweeper_handle = tokio::spawn(sweeper.start());

    tokio::select! {
        result = sweeper_handle => {
            match result {
                Ok(()) => log::info!("Sweeper exited"),
                Err(e) => {
                    log::error!("Sweeper task panicked: {}", e);
                    std::process::exit(1);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received shutdown signal, exiting");
        }
    }

    Ok(())
}
