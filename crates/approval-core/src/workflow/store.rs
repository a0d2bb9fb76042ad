//! In-memory approval request store
//!
//! All state transitions happen as compare-and-set operations under a
//! single write lock, which is never held across an await point. A caller
//! losing a race on a step receives a Conflict, never a silent no-op.

use crate::error::{EngineError, Result};
use approval_types::{
    ActivityId, ActivityType, ApprovalRequest, PersonId, RequestId, RequestStatus, StepStatus,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outcome applied to the current step by [`RequestStore::complete_step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Approved,
    Rejected,
}

#[derive(Default)]
struct StoreInner {
    requests: HashMap<RequestId, ApprovalRequest>,
    /// Enforces the one-pending-request-per-activity invariant
    pending: HashMap<(ActivityType, ActivityId), RequestId>,
}

/// Thread-safe store of approval requests
///
/// Requests are never physically deleted; terminal requests remain as an
/// audit record.
pub struct RequestStore {
    inner: RwLock<StoreInner>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a freshly created pending request
    ///
    /// Fails if the activity already has a pending request; a second
    /// workflow never silently replaces the first.
    pub fn insert(&self, request: ApprovalRequest) -> Result<()> {
        if request.status != RequestStatus::Pending {
            return Err(EngineError::State(format!(
                "Cannot insert request {} with status {}",
                request.id, request.status
            )));
        }

        let key = (request.activity_type.clone(), request.activity_id.clone());
        let mut inner = self.write();

        if let Some(existing) = inner.pending.get(&key) {
            return Err(EngineError::State(format!(
                "Activity {}/{} already has pending approval request {}",
                key.0, key.1, existing
            )));
        }

        inner.pending.insert(key, request.id.clone());
        log::info!(
            "Created approval request {} for {}/{}",
            request.id,
            request.activity_type,
            request.activity_id
        );
        inner.requests.insert(request.id.clone(), request);
        Ok(())
    }

    pub fn get(&self, request_id: &RequestId) -> Option<ApprovalRequest> {
        self.read().requests.get(request_id).cloned()
    }

    /// The most recent request for an activity, pending or terminal
    pub fn latest_for_activity(
        &self,
        activity_type: &ActivityType,
        activity_id: &ActivityId,
    ) -> Option<ApprovalRequest> {
        let inner = self.read();
        let key = (activity_type.clone(), activity_id.clone());

        if let Some(request_id) = inner.pending.get(&key) {
            return inner.requests.get(request_id).cloned();
        }

        inner
            .requests
            .values()
            .filter(|r| &r.activity_type == activity_type && &r.activity_id == activity_id)
            .max_by_key(|r| r.created_at)
            .cloned()
    }

    /// All requests still awaiting a decision
    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        self.read()
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect()
    }

    /// Atomically action the current step of a request
    ///
    /// The request must still be pending and the step at `step_order` must
    /// be the current step and itself pending; any mismatch means another
    /// caller won the race and yields a Conflict. On approval the current
    /// step pointer advances past skipped steps, approving the request
    /// when none remain. On rejection the request terminates immediately
    /// and later steps are left untouched.
    pub fn complete_step(
        &self,
        request_id: &RequestId,
        step_order: u32,
        outcome: StepOutcome,
        actor: &PersonId,
        comments: Option<String>,
    ) -> Result<ApprovalRequest> {
        let now = Utc::now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let request = inner
            .requests
            .get_mut(request_id)
            .ok_or_else(|| EngineError::NotFound(format!("Request {} not found", request_id)))?;

        if request.status != RequestStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "Request {} is already {}",
                request_id, request.status
            )));
        }

        let current = request.current_step.ok_or_else(|| {
            EngineError::Conflict(format!("Request {} has no actionable step", request_id))
        })?;

        let step = &mut request.steps[current];
        if step.order != step_order {
            return Err(EngineError::Conflict(format!(
                "Step {} of request {} is not the current step (current is {})",
                step_order, request_id, step.order
            )));
        }

        if step.status != StepStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "Step {} of request {} was already actioned ({})",
                step_order, request_id, step.status
            )));
        }

        step.status = match outcome {
            StepOutcome::Approved => StepStatus::Approved,
            StepOutcome::Rejected => StepStatus::Rejected,
        };
        step.acted_by = Some(actor.clone());
        step.acted_at = Some(now);
        step.comments = comments;

        match outcome {
            StepOutcome::Approved => {
                let next = request
                    .steps
                    .iter()
                    .enumerate()
                    .skip(current + 1)
                    .find(|(_, s)| s.status == StepStatus::Pending)
                    .map(|(i, _)| i);

                match next {
                    Some(index) => {
                        request.current_step = Some(index);
                        log::info!(
                            "Request {}: step {} approved by {}, advancing to step {}",
                            request_id,
                            step_order,
                            actor,
                            request.steps[index].order
                        );
                    }
                    None => {
                        request.status = RequestStatus::Approved;
                        request.current_step = None;
                        request.completed_at = Some(now);
                        let key =
                            (request.activity_type.clone(), request.activity_id.clone());
                        log::info!(
                            "Request {}: final step {} approved by {}, request approved",
                            request_id,
                            step_order,
                            actor
                        );
                        let snapshot = request.clone();
                        inner.pending.remove(&key);
                        return Ok(snapshot);
                    }
                }
            }
            StepOutcome::Rejected => {
                request.status = RequestStatus::Rejected;
                request.current_step = None;
                request.completed_at = Some(now);
                let key = (request.activity_type.clone(), request.activity_id.clone());
                log::info!(
                    "Request {}: step {} rejected by {}, request rejected",
                    request_id,
                    step_order,
                    actor
                );
                let snapshot = request.clone();
                inner.pending.remove(&key);
                return Ok(snapshot);
            }
        }

        Ok(request.clone())
    }

    /// Cancel a pending request; only the original requestor may do so
    ///
    /// Steps are not mutated: cancellation is a request-level terminal
    /// transition.
    pub fn cancel(&self, request_id: &RequestId, actor: &PersonId) -> Result<ApprovalRequest> {
        let now = Utc::now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let request = inner
            .requests
            .get_mut(request_id)
            .ok_or_else(|| EngineError::NotFound(format!("Request {} not found", request_id)))?;

        if &request.requestor != actor {
            return Err(EngineError::State(format!(
                "Only requestor {} may cancel request {}",
                request.requestor, request_id
            )));
        }

        if request.status != RequestStatus::Pending {
            return Err(EngineError::State(format!(
                "Cannot cancel request {} from status {}",
                request_id, request.status
            )));
        }

        request.status = RequestStatus::Cancelled;
        request.current_step = None;
        request.completed_at = Some(now);

        let key = (request.activity_type.clone(), request.activity_id.clone());
        log::info!("Request {} cancelled by {}", request_id, actor);
        let snapshot = request.clone();
        inner.pending.remove(&key);
        Ok(snapshot)
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{
        ApproverSpec, Assignee, CompanyId, RequestStep, TemplateId,
    };

    fn step(order: u32, status: StepStatus) -> RequestStep {
        RequestStep {
            order,
            name: format!("Step {}", order),
            approver: ApproverSpec::Person(PersonId::new(format!("approver-{}", order))),
            assignee: Some(Assignee::Person(PersonId::new(format!("approver-{}", order)))),
            status,
            acted_by: None,
            acted_at: None,
            comments: None,
            auto_approve_after_days: None,
            created_at: Utc::now(),
        }
    }

    fn request(activity_id: &str, steps: Vec<RequestStep>) -> ApprovalRequest {
        let current = steps.iter().position(|s| s.status == StepStatus::Pending);
        ApprovalRequest {
            id: RequestId::new(),
            company: CompanyId::new("acme"),
            activity_type: ActivityType::new("leave_application"),
            activity_id: ActivityId::new(activity_id),
            activity_title: "Annual leave".to_string(),
            requestor: PersonId::new("emp-1"),
            template_id: TemplateId::new(),
            current_step: current,
            total_steps: steps.len() as u32,
            status: RequestStatus::Pending,
            steps,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_duplicate_pending_insert_fails() {
        let store = RequestStore::new();
        store
            .insert(request("leave-1", vec![step(1, StepStatus::Pending)]))
            .unwrap();

        let err = store
            .insert(request("leave-1", vec![step(1, StepStatus::Pending)]))
            .unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[test]
    fn test_approve_advances_past_skipped() {
        let store = RequestStore::new();
        let req = request(
            "leave-2",
            vec![
                step(1, StepStatus::Pending),
                step(2, StepStatus::Skipped),
                step(3, StepStatus::Pending),
            ],
        );
        let id = req.id.clone();
        store.insert(req).unwrap();

        let updated = store
            .complete_step(&id, 1, StepOutcome::Approved, &PersonId::new("approver-1"), None)
            .unwrap();

        assert_eq!(updated.status, RequestStatus::Pending);
        assert_eq!(updated.current_step, Some(2));
        assert_eq!(updated.steps[0].status, StepStatus::Approved);
        assert_eq!(updated.steps[1].status, StepStatus::Skipped);
    }

    #[test]
    fn test_final_approval_terminates_request() {
        let store = RequestStore::new();
        let req = request("leave-3", vec![step(1, StepStatus::Pending)]);
        let id = req.id.clone();
        store.insert(req).unwrap();

        let updated = store
            .complete_step(&id, 1, StepOutcome::Approved, &PersonId::new("approver-1"), None)
            .unwrap();

        assert_eq!(updated.status, RequestStatus::Approved);
        assert_eq!(updated.current_step, None);
        assert!(updated.completed_at.is_some());

        // The activity is free for a new request once terminal
        store
            .insert(request("leave-3", vec![step(1, StepStatus::Pending)]))
            .unwrap();
    }

    #[test]
    fn test_reject_leaves_later_steps_pending() {
        let store = RequestStore::new();
        let req = request(
            "leave-4",
            vec![
                step(1, StepStatus::Pending),
                step(2, StepStatus::Pending),
                step(3, StepStatus::Pending),
                step(4, StepStatus::Pending),
            ],
        );
        let id = req.id.clone();
        store.insert(req).unwrap();

        store
            .complete_step(&id, 1, StepOutcome::Approved, &PersonId::new("approver-1"), None)
            .unwrap();
        let updated = store
            .complete_step(
                &id,
                2,
                StepOutcome::Rejected,
                &PersonId::new("approver-2"),
                Some("over budget".to_string()),
            )
            .unwrap();

        assert_eq!(updated.status, RequestStatus::Rejected);
        assert_eq!(updated.steps[1].status, StepStatus::Rejected);
        assert_eq!(updated.steps[2].status, StepStatus::Pending);
        assert_eq!(updated.steps[3].status, StepStatus::Pending);
        assert_eq!(updated.steps[1].comments.as_deref(), Some("over budget"));
    }

    #[test]
    fn test_double_action_conflicts() {
        let store = RequestStore::new();
        let req = request(
            "leave-5",
            vec![step(1, StepStatus::Pending), step(2, StepStatus::Pending)],
        );
        let id = req.id.clone();
        store.insert(req).unwrap();

        store
            .complete_step(&id, 1, StepOutcome::Approved, &PersonId::new("approver-1"), None)
            .unwrap();
        let err = store
            .complete_step(&id, 1, StepOutcome::Approved, &PersonId::new("approver-1"), None)
            .unwrap_err();

        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn test_terminal_request_is_inert() {
        let store = RequestStore::new();
        let req = request("leave-6", vec![step(1, StepStatus::Pending)]);
        let id = req.id.clone();
        let requestor = req.requestor.clone();
        store.insert(req).unwrap();

        store
            .complete_step(&id, 1, StepOutcome::Approved, &PersonId::new("approver-1"), None)
            .unwrap();

        let err = store
            .complete_step(&id, 1, StepOutcome::Rejected, &PersonId::new("approver-1"), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let err = store.cancel(&id, &requestor).unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
    }

    #[test]
    fn test_cancel_is_requestor_only() {
        let store = RequestStore::new();
        let req = request("leave-7", vec![step(1, StepStatus::Pending)]);
        let id = req.id.clone();
        store.insert(req).unwrap();

        let err = store.cancel(&id, &PersonId::new("someone-else")).unwrap_err();
        assert!(matches!(err, EngineError::State(_)));

        let cancelled = store.cancel(&id, &PersonId::new("emp-1")).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        // Steps untouched by cancellation
        assert_eq!(cancelled.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_latest_for_activity_prefers_pending() {
        let store = RequestStore::new();
        let first = request("leave-8", vec![step(1, StepStatus::Pending)]);
        let first_id = first.id.clone();
        let requestor = first.requestor.clone();
        store.insert(first).unwrap();
        store.cancel(&first_id, &requestor).unwrap();

        let second = request("leave-8", vec![step(1, StepStatus::Pending)]);
        let second_id = second.id.clone();
        store.insert(second).unwrap();

        let latest = store
            .latest_for_activity(&ActivityType::new("leave_application"), &ActivityId::new("leave-8"))
            .unwrap();
        assert_eq!(latest.id, second_id);
    }
}
