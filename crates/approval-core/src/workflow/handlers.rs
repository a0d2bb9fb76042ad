//! Activity handler contract and registry
//!
//! Each domain module registers one handler per activity type at process
//! start. The engine calls exactly one callback, exactly once, when a
//! request reaches a terminal state; it never inspects domain data.

use crate::error::{EngineError, Result};
use approval_types::{ActivityId, ActivityType, PersonId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Completion callbacks a domain module exposes to the engine
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// The request reached final approval
    async fn on_approved(&self, activity_id: &ActivityId, approved_by: &PersonId) -> Result<()>;

    /// The request was rejected at some step
    async fn on_rejected(
        &self,
        activity_id: &ActivityId,
        rejected_by: &PersonId,
        reason: &str,
    ) -> Result<()>;

    /// The requestor withdrew the request
    async fn on_cancelled(
        &self,
        activity_id: &ActivityId,
        cancelled_by: &PersonId,
        reason: Option<&str>,
    ) -> Result<()>;
}

/// Lookup from activity type to the registered completion handler
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<ActivityType, Arc<dyn ActivityHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler; replaces any previous registration
    pub fn register(&self, activity_type: ActivityType, handler: Arc<dyn ActivityHandler>) {
        log::info!("Registered activity handler for {}", activity_type);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(activity_type, handler);
    }

    pub fn get(&self, activity_type: &ActivityType) -> Option<Arc<dyn ActivityHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(activity_type)
            .cloned()
    }

    pub fn contains(&self, activity_type: &ActivityType) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(activity_type)
    }

    /// Fetch the handler or fail with a configuration error
    pub fn require(&self, activity_type: &ActivityType) -> Result<Arc<dyn ActivityHandler>> {
        self.get(activity_type).ok_or_else(|| {
            EngineError::Config(format!(
                "No handler registered for activity type {}",
                activity_type
            ))
        })
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl ActivityHandler for NoopHandler {
        async fn on_approved(&self, _: &ActivityId, _: &PersonId) -> Result<()> {
            Ok(())
        }

        async fn on_rejected(&self, _: &ActivityId, _: &PersonId, _: &str) -> Result<()> {
            Ok(())
        }

        async fn on_cancelled(&self, _: &ActivityId, _: &PersonId, _: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        let leave = ActivityType::new("leave_application");

        assert!(!registry.contains(&leave));
        assert!(matches!(registry.require(&leave), Err(EngineError::Config(_))));

        registry.register(leave.clone(), Arc::new(NoopHandler));

        assert!(registry.contains(&leave));
        assert!(registry.require(&leave).is_ok());
        assert!(!registry.contains(&ActivityType::new("asset_request")));
    }
}
