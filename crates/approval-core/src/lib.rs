//! Approval Engine Core Library
//!
//! Generic, multi-tenant approval workflow engine: per-company workflow
//! templates, role- and hierarchy-based approver resolution, a linear
//! request state machine with atomic step transitions, decoupled domain
//! callbacks, and time-based auto-escalation.

pub mod config;
pub mod directory;
pub mod error;
pub mod templates;
pub mod workflow;

// Re-export main types for easy access
pub use config::EngineConfig;
pub use error::{EngineError, Result};

pub use directory::{OrgDirectory, StaticDirectory};
pub use templates::{NewStep, TemplateStore};

// Re-export workflow components
pub use workflow::{
    ActivityHandler,
    EscalationSweeper,
    HandlerRegistry,
    RequestEngine,
    RequestStore,
};
