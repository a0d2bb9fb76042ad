//! Shared harness for engine integration tests
#![allow(dead_code)]

use approval_core::workflow::handlers::ActivityHandler;
use approval_core::{
    EngineError, HandlerRegistry, NewStep, RequestEngine, RequestStore, Result, StaticDirectory,
    TemplateStore,
};
use approval_types::{
    Activity, ActivityId, ActivityType, ApproverSpec, AttributeValue, CompanyId, PersonId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Handler that records every callback and can be told to fail
#[derive(Default)]
pub struct RecordingHandler {
    pub approved: Mutex<Vec<(ActivityId, PersonId)>>,
    pub rejected: Mutex<Vec<(ActivityId, PersonId, String)>>,
    pub cancelled: Mutex<Vec<(ActivityId, PersonId, Option<String>)>>,
    pub fail_on_approved: AtomicBool,
}

impl RecordingHandler {
    pub fn approved_count(&self) -> usize {
        self.approved.lock().unwrap().len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.lock().unwrap().len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.lock().unwrap().len()
    }
}

#[async_trait]
impl ActivityHandler for RecordingHandler {
    async fn on_approved(&self, activity_id: &ActivityId, approved_by: &PersonId) -> Result<()> {
        if self.fail_on_approved.load(Ordering::SeqCst) {
            return Err(EngineError::Handler("domain module unavailable".to_string()));
        }
        self.approved
            .lock()
            .unwrap()
            .push((activity_id.clone(), approved_by.clone()));
        Ok(())
    }

    async fn on_rejected(
        &self,
        activity_id: &ActivityId,
        rejected_by: &PersonId,
        reason: &str,
    ) -> Result<()> {
        self.rejected
            .lock()
            .unwrap()
            .push((activity_id.clone(), rejected_by.clone(), reason.to_string()));
        Ok(())
    }

    async fn on_cancelled(
        &self,
        activity_id: &ActivityId,
        cancelled_by: &PersonId,
        reason: Option<&str>,
    ) -> Result<()> {
        self.cancelled.lock().unwrap().push((
            activity_id.clone(),
            cancelled_by.clone(),
            reason.map(|r| r.to_string()),
        ));
        Ok(())
    }
}

pub struct Harness {
    pub templates: Arc<TemplateStore>,
    pub registry: Arc<HandlerRegistry>,
    pub engine: Arc<RequestEngine<StaticDirectory>>,
    pub handler: Arc<RecordingHandler>,
}

pub const COMPANY: &str = "acme";
pub const LEAVE: &str = "leave_application";

/// Engine over a small org chart:
/// ceo <- mgr-1 (role manager) <- emp-1
/// ceo <- fin-1, fin-2 (role finance)
/// hr-1 (role hr)
pub fn harness() -> Harness {
    let company = CompanyId::new(COMPANY);
    let mut directory = StaticDirectory::new();
    directory.add_person(company.clone(), PersonId::new("ceo"), None, vec![]);
    directory.add_person(
        company.clone(),
        PersonId::new("mgr-1"),
        Some(PersonId::new("ceo")),
        vec!["manager".to_string()],
    );
    directory.add_person(
        company.clone(),
        PersonId::new("fin-1"),
        Some(PersonId::new("ceo")),
        vec!["finance".to_string()],
    );
    directory.add_person(
        company.clone(),
        PersonId::new("fin-2"),
        Some(PersonId::new("ceo")),
        vec!["finance".to_string()],
    );
    directory.add_person(company.clone(), PersonId::new("hr-1"), None, vec!["hr".to_string()]);
    directory.add_person(
        company,
        PersonId::new("emp-1"),
        Some(PersonId::new("mgr-1")),
        vec![],
    );

    let templates = Arc::new(TemplateStore::new());
    let store = Arc::new(RequestStore::new());
    let registry = Arc::new(HandlerRegistry::new());
    let handler = Arc::new(RecordingHandler::default());
    registry.register(ActivityType::new(LEAVE), handler.clone());

    let engine = Arc::new(RequestEngine::new(
        templates.clone(),
        store,
        registry.clone(),
        Arc::new(directory),
        PersonId::new("system"),
    ));

    Harness {
        templates,
        registry,
        engine,
        handler,
    }
}

pub fn person_step(name: &str, person: &str) -> NewStep {
    NewStep {
        name: name.to_string(),
        approver: ApproverSpec::Person(PersonId::new(person)),
        required: true,
        skippable: false,
        auto_approve_after_days: None,
        condition: None,
    }
}

pub fn role_step(name: &str, role: &str) -> NewStep {
    NewStep {
        name: name.to_string(),
        approver: ApproverSpec::Role(role.to_string()),
        required: true,
        skippable: false,
        auto_approve_after_days: None,
        condition: None,
    }
}

pub fn manager_step(name: &str) -> NewStep {
    NewStep {
        name: name.to_string(),
        approver: ApproverSpec::RequestorManager,
        required: true,
        skippable: false,
        auto_approve_after_days: None,
        condition: None,
    }
}

/// Create a template for (acme, leave_application) and make it the default
pub fn install_template(harness: &Harness, steps: Vec<NewStep>) -> approval_types::WorkflowTemplate {
    let template = harness
        .templates
        .create_template(
            CompanyId::new(COMPANY),
            ActivityType::new(LEAVE),
            "Leave approval".to_string(),
            None,
            steps,
        )
        .unwrap();
    harness.templates.set_as_default(&template.id).unwrap()
}

pub fn activity(activity_id: &str, requestor: &str) -> Activity {
    Activity {
        company: CompanyId::new(COMPANY),
        activity_type: ActivityType::new(LEAVE),
        activity_id: ActivityId::new(activity_id),
        title: format!("Leave request {}", activity_id),
        requestor: PersonId::new(requestor),
        attributes: HashMap::new(),
    }
}

pub fn activity_with_attrs(
    activity_id: &str,
    requestor: &str,
    attrs: &[(&str, AttributeValue)],
) -> Activity {
    let mut act = activity(activity_id, requestor);
    act.attributes = attrs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    act
}
