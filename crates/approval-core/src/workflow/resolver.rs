//! Step resolver
//!
//! Materializes abstract approver specifications into concrete assignees
//! when the request snapshot is taken. After this point the engine never
//! branches on approver kind again.

use crate::directory::OrgDirectory;
use crate::error::{EngineError, Result};
use crate::workflow::condition;
use approval_types::{Activity, ApproverSpec, Assignee, RequestStep, StepDefinition, StepStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Resolves step definitions against the org directory
pub struct StepResolver<D: OrgDirectory> {
    directory: Arc<D>,
}

impl<D: OrgDirectory> StepResolver<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    /// Snapshot one step definition for the given activity
    ///
    /// A step whose condition evaluates false, or whose approver cannot be
    /// resolved and which is skippable (or not required), is materialized
    /// as Skipped and never blocks the request. An unresolvable approver
    /// on a required, non-skippable step is a configuration error.
    pub async fn materialize(
        &self,
        definition: &StepDefinition,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<RequestStep> {
        if let Some(expression) = &definition.condition {
            let predicate = condition::parse(expression).map_err(|e| {
                EngineError::Config(format!(
                    "Invalid condition on step '{}': {}",
                    definition.name, e
                ))
            })?;

            if !predicate.evaluate(&activity.attributes) {
                log::debug!(
                    "Step '{}' skipped for {}: condition '{}' is false",
                    definition.name,
                    activity.activity_id,
                    expression
                );
                return Ok(self.snapshot(definition, None, StepStatus::Skipped, now));
            }
        }

        let assignee = match &definition.approver {
            ApproverSpec::Person(person) => Some(Assignee::Person(person.clone())),
            ApproverSpec::Role(role) => {
                let mut holders = self
                    .directory
                    .role_holders(&activity.company, role)
                    .await?;

                if holders.is_empty() {
                    return self.skip_unresolved(
                        definition,
                        now,
                        &format!("role '{}' has no holders in {}", role, activity.company),
                    );
                }

                if holders.len() == 1 {
                    // A single holder collapses to a direct assignment
                    Some(Assignee::Person(holders.remove(0)))
                } else {
                    Some(Assignee::Role(role.clone()))
                }
            }
            ApproverSpec::RequestorManager => {
                match self
                    .directory
                    .manager_of(&activity.company, &activity.requestor)
                    .await?
                {
                    Some(manager) => Some(Assignee::Person(manager)),
                    None => {
                        return self.skip_unresolved(
                            definition,
                            now,
                            &format!("requestor {} has no manager", activity.requestor),
                        )
                    }
                }
            }
        };

        Ok(self.snapshot(definition, assignee, StepStatus::Pending, now))
    }

    fn skip_unresolved(
        &self,
        definition: &StepDefinition,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<RequestStep> {
        if definition.skippable || !definition.required {
            log::info!("Step '{}' skipped: {}", definition.name, reason);
            return Ok(self.snapshot(definition, None, StepStatus::Skipped, now));
        }

        Err(EngineError::Config(format!(
            "Cannot resolve approver for required step '{}': {}",
            definition.name, reason
        )))
    }

    fn snapshot(
        &self,
        definition: &StepDefinition,
        assignee: Option<Assignee>,
        status: StepStatus,
        now: DateTime<Utc>,
    ) -> RequestStep {
        RequestStep {
            order: definition.order,
            name: definition.name.clone(),
            approver: definition.approver.clone(),
            assignee,
            status,
            acted_by: None,
            acted_at: None,
            comments: None,
            auto_approve_after_days: definition.auto_approve_after_days,
            created_at: now,
        }
    }
}
