//! Request engine - the approval state machine
//!
//! Creates request instances from a frozen template snapshot, advances
//! them through approve/reject/cancel, and notifies the owning domain
//! module through the handler registry on terminal transitions. Handler
//! dispatch always happens after the state transition has committed; a
//! handler failure is surfaced to the caller but never rolls the
//! workflow decision back.

use crate::directory::OrgDirectory;
use crate::error::{EngineError, Result};
use crate::templates::TemplateStore;
use crate::workflow::handlers::HandlerRegistry;
use crate::workflow::resolver::StepResolver;
use crate::workflow::store::{RequestStore, StepOutcome};
use approval_types::{
    Activity, ActivityId, ActivityType, ApprovalRequest, Assignee, PendingApproval, PersonId,
    RequestId, RequestStatus, RequestStep, StepStatus,
};
use chrono::Utc;
use std::sync::Arc;

/// The approval workflow state machine
pub struct RequestEngine<D: OrgDirectory> {
    templates: Arc<TemplateStore>,
    store: Arc<RequestStore>,
    registry: Arc<HandlerRegistry>,
    directory: Arc<D>,
    resolver: StepResolver<D>,
    system_actor: PersonId,
}

impl<D: OrgDirectory> RequestEngine<D> {
    pub fn new(
        templates: Arc<TemplateStore>,
        store: Arc<RequestStore>,
        registry: Arc<HandlerRegistry>,
        directory: Arc<D>,
        system_actor: PersonId,
    ) -> Self {
        let resolver = StepResolver::new(directory.clone());
        Self {
            templates,
            store,
            registry,
            directory,
            resolver,
            system_actor,
        }
    }

    /// Start a workflow for an activity
    ///
    /// Fails before creating any state when the activity already has a
    /// pending request, no handler is registered for the activity type,
    /// no active template exists, or the template yields no actionable
    /// step after condition evaluation and approver resolution.
    pub async fn start_workflow(&self, activity: Activity) -> Result<ApprovalRequest> {
        // A workflow that can never notify its domain module must not start
        self.registry.require(&activity.activity_type)?;

        if let Some(existing) = self
            .store
            .latest_for_activity(&activity.activity_type, &activity.activity_id)
        {
            if existing.status == RequestStatus::Pending {
                return Err(EngineError::State(format!(
                    "Activity {}/{} already has pending approval request {}",
                    activity.activity_type, activity.activity_id, existing.id
                )));
            }
        }

        let template = self
            .templates
            .get_active_template(&activity.company, &activity.activity_type)
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "No active workflow template for {}/{}",
                    activity.company, activity.activity_type
                ))
            })?;

        let now = Utc::now();
        let mut steps: Vec<RequestStep> = Vec::with_capacity(template.steps.len());
        for definition in &template.steps {
            steps.push(self.resolver.materialize(definition, &activity, now).await?);
        }

        let current_step = steps.iter().position(|s| s.status == StepStatus::Pending);
        let Some(current_step) = current_step else {
            return Err(EngineError::Config(format!(
                "Template {} yields no actionable step for {}/{}",
                template.id, activity.activity_type, activity.activity_id
            )));
        };

        let request = ApprovalRequest {
            id: RequestId::new(),
            company: activity.company,
            activity_type: activity.activity_type,
            activity_id: activity.activity_id,
            activity_title: activity.title,
            requestor: activity.requestor,
            template_id: template.id,
            current_step: Some(current_step),
            total_steps: steps.len() as u32,
            status: RequestStatus::Pending,
            steps,
            created_at: now,
            completed_at: None,
        };

        // The store re-checks the pending-uniqueness invariant atomically;
        // a concurrent start for the same activity loses here.
        self.store.insert(request.clone())?;
        Ok(request)
    }

    /// Approve the current step of a request
    pub async fn approve(
        &self,
        request_id: &RequestId,
        approver: &PersonId,
        comments: Option<String>,
    ) -> Result<ApprovalRequest> {
        let step_order = self.authorize_action(request_id, approver).await?;
        let updated =
            self.store
                .complete_step(request_id, step_order, StepOutcome::Approved, approver, comments)?;

        self.dispatch_if_approved(&updated, approver).await?;
        Ok(updated)
    }

    /// Reject the request at its current step
    ///
    /// Terminal regardless of which step it occurs on; steps after the
    /// acting one are left untouched.
    pub async fn reject(
        &self,
        request_id: &RequestId,
        approver: &PersonId,
        reason: String,
    ) -> Result<ApprovalRequest> {
        let step_order = self.authorize_action(request_id, approver).await?;
        let updated = self.store.complete_step(
            request_id,
            step_order,
            StepOutcome::Rejected,
            approver,
            Some(reason.clone()),
        )?;

        let handler = self.registry.require(&updated.activity_type)?;
        handler
            .on_rejected(&updated.activity_id, approver, &reason)
            .await
            .map_err(|e| {
                EngineError::Handler(format!(
                    "Request {} rejected but handler for {} failed: {}",
                    updated.id, updated.activity_type, e
                ))
            })?;

        Ok(updated)
    }

    /// Cancel a pending request; only the original requestor may do so
    pub async fn cancel(
        &self,
        request_id: &RequestId,
        requestor: &PersonId,
        reason: Option<String>,
    ) -> Result<ApprovalRequest> {
        let updated = self.store.cancel(request_id, requestor)?;

        let handler = self.registry.require(&updated.activity_type)?;
        handler
            .on_cancelled(&updated.activity_id, requestor, reason.as_deref())
            .await
            .map_err(|e| {
                EngineError::Handler(format!(
                    "Request {} cancelled but handler for {} failed: {}",
                    updated.id, updated.activity_type, e
                ))
            })?;

        Ok(updated)
    }

    /// Force the current step through as the system actor
    ///
    /// The sweeper's path past the auto-approval deadline. Reuses the
    /// same compare-and-set transition as a human approval, so a human
    /// acting at the same moment resolves to exactly one winner; only
    /// the assignment check is bypassed (the deadline, not the assignee,
    /// authorizes the action).
    pub(crate) async fn auto_approve(
        &self,
        request_id: &RequestId,
        step_order: u32,
        comments: String,
    ) -> Result<ApprovalRequest> {
        let actor = self.system_actor.clone();
        let updated = self.store.complete_step(
            request_id,
            step_order,
            StepOutcome::Approved,
            &actor,
            Some(comments),
        )?;

        self.dispatch_if_approved(&updated, &actor).await?;
        Ok(updated)
    }

    /// Read one request
    pub fn get_request(&self, request_id: &RequestId) -> Result<ApprovalRequest> {
        self.store
            .get(request_id)
            .ok_or_else(|| EngineError::NotFound(format!("Request {} not found", request_id)))
    }

    /// The most recent request for an activity, pending or historical
    pub fn get_activity_status(
        &self,
        activity_type: &ActivityType,
        activity_id: &ActivityId,
    ) -> Option<ApprovalRequest> {
        self.store.latest_for_activity(activity_type, activity_id)
    }

    /// All requests still awaiting a decision
    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        self.store.pending_requests()
    }

    /// Every pending step currently waiting on the given person
    ///
    /// Includes role-assigned steps when the directory says the person
    /// holds the role in the request's company. Steps of non-pending
    /// requests are never listed.
    pub async fn pending_approvals_for(&self, person: &PersonId) -> Result<Vec<PendingApproval>> {
        let mut approvals = Vec::new();

        for request in self.store.pending_requests() {
            let Some(step) = request.active_step() else {
                continue;
            };
            let Some(assignee) = step.assignee.clone() else {
                continue;
            };

            let assigned = match &assignee {
                Assignee::Person(p) => p == person,
                Assignee::Role(role) => {
                    self.directory
                        .holds_role(&request.company, person, role)
                        .await?
                }
            };

            if assigned {
                approvals.push(PendingApproval {
                    request_id: request.id.clone(),
                    company: request.company.clone(),
                    activity_type: request.activity_type.clone(),
                    activity_id: request.activity_id.clone(),
                    activity_title: request.activity_title.clone(),
                    requestor: request.requestor.clone(),
                    step_order: step.order,
                    step_name: step.name.clone(),
                    assignee,
                    requested_at: request.created_at,
                });
            }
        }

        approvals.sort_by_key(|a| a.requested_at);
        Ok(approvals)
    }

    /// Validate that the request is actionable by this approver and
    /// return the current step's order for the compare-and-set
    async fn authorize_action(&self, request_id: &RequestId, approver: &PersonId) -> Result<u32> {
        let request = self.get_request(request_id)?;

        if request.status != RequestStatus::Pending {
            return Err(EngineError::State(format!(
                "Request {} is {}, not pending",
                request_id, request.status
            )));
        }

        let step = request.active_step().ok_or_else(|| {
            EngineError::State(format!("Request {} has no actionable step", request_id))
        })?;

        let authorized = match &step.assignee {
            Some(Assignee::Person(p)) => p == approver,
            Some(Assignee::Role(role)) => {
                self.directory
                    .holds_role(&request.company, approver, role)
                    .await?
            }
            None => false,
        };

        if !authorized {
            return Err(EngineError::State(format!(
                "{} is not an assignee of step {} of request {}",
                approver, step.order, request_id
            )));
        }

        Ok(step.order)
    }

    async fn dispatch_if_approved(
        &self,
        updated: &ApprovalRequest,
        actor: &PersonId,
    ) -> Result<()> {
        if updated.status != RequestStatus::Approved {
            return Ok(());
        }

        let handler = self.registry.require(&updated.activity_type)?;
        handler
            .on_approved(&updated.activity_id, actor)
            .await
            .map_err(|e| {
                EngineError::Handler(format!(
                    "Request {} approved but handler for {} failed: {}",
                    updated.id, updated.activity_type, e
                ))
            })
    }
}
