//! Workflow template store
//!
//! Owns workflow definitions per (company, activity type). Template edits
//! never reach requests that were already started: the request engine takes
//! frozen copies of the step list at creation time.

use crate::error::{EngineError, Result};
use crate::workflow::condition;
use approval_types::{
    ActivityType, ApproverSpec, CompanyId, StepDefinition, StepId, TemplateId, WorkflowTemplate,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Input for creating or replacing a step definition
#[derive(Debug, Clone)]
pub struct NewStep {
    pub name: String,
    pub approver: ApproverSpec,
    pub required: bool,
    pub skippable: bool,
    pub auto_approve_after_days: Option<u32>,
    pub condition: Option<String>,
}

impl NewStep {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("Step name must not be empty".to_string()));
        }

        if let ApproverSpec::Role(role) = &self.approver {
            if role.trim().is_empty() {
                return Err(EngineError::Validation(
                    "Role approver must name a role".to_string(),
                ));
            }
        }

        if let Some(expr) = &self.condition {
            condition::validate(expr)?;
        }

        Ok(())
    }
}

/// Thread-safe store of workflow templates
pub struct TemplateStore {
    templates: RwLock<HashMap<TemplateId, WorkflowTemplate>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TemplateId, WorkflowTemplate>> {
        self.templates.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TemplateId, WorkflowTemplate>> {
        self.templates.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new template with the given ordered steps
    ///
    /// The template starts active but is not the default until
    /// [`set_as_default`](Self::set_as_default) designates it.
    pub fn create_template(
        &self,
        company: CompanyId,
        activity_type: ActivityType,
        name: String,
        description: Option<String>,
        steps: Vec<NewStep>,
    ) -> Result<WorkflowTemplate> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "Template name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let step_definitions = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| {
                step.validate()?;
                Ok(StepDefinition {
                    id: StepId::new(),
                    order: i as u32 + 1,
                    name: step.name,
                    approver: step.approver,
                    required: step.required,
                    skippable: step.skippable,
                    auto_approve_after_days: step.auto_approve_after_days,
                    condition: step.condition,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let template = WorkflowTemplate {
            id: TemplateId::new(),
            company,
            activity_type,
            name,
            description,
            active: true,
            is_default: false,
            steps: step_definitions,
            created_at: now,
            updated_at: now,
        };

        self.write().insert(template.id.clone(), template.clone());
        log::info!(
            "Created template {} ({}/{})",
            template.id,
            template.company,
            template.activity_type
        );

        Ok(template)
    }

    /// Update name, description and active flag
    pub fn update_template(
        &self,
        template_id: &TemplateId,
        name: String,
        description: Option<String>,
        active: bool,
    ) -> Result<WorkflowTemplate> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "Template name must not be empty".to_string(),
            ));
        }

        let mut templates = self.write();
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", template_id)))?;

        template.name = name;
        template.description = description;
        template.active = active;
        template.updated_at = Utc::now();

        log::info!("Updated template {}", template_id);
        Ok(template.clone())
    }

    /// Delete a template
    ///
    /// Fails while the template is the current default for its activity
    /// type: a replacement default must be designated first.
    pub fn delete_template(&self, template_id: &TemplateId) -> Result<()> {
        let mut templates = self.write();
        let template = templates
            .get(template_id)
            .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", template_id)))?;

        if template.is_default {
            return Err(EngineError::Validation(format!(
                "Template {} is the default for {}/{}; set another default before deleting",
                template_id, template.company, template.activity_type
            )));
        }

        templates.remove(template_id);
        log::info!("Deleted template {}", template_id);
        Ok(())
    }

    /// Make this template the default for its (company, activity type)
    ///
    /// Atomic relative to other templates of the same key: the previous
    /// default is cleared in the same operation.
    pub fn set_as_default(&self, template_id: &TemplateId) -> Result<WorkflowTemplate> {
        let mut templates = self.write();

        let (company, activity_type) = {
            let template = templates.get(template_id).ok_or_else(|| {
                EngineError::NotFound(format!("Template {} not found", template_id))
            })?;

            if !template.active {
                return Err(EngineError::Validation(format!(
                    "Template {} is inactive and cannot be the default",
                    template_id
                )));
            }

            (template.company.clone(), template.activity_type.clone())
        };

        for template in templates.values_mut() {
            if template.company == company
                && template.activity_type == activity_type
                && template.is_default
                && &template.id != template_id
            {
                template.is_default = false;
                template.updated_at = Utc::now();
            }
        }

        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", template_id)))?;
        template.is_default = true;
        template.updated_at = Utc::now();

        log::info!(
            "Template {} is now the default for {}/{}",
            template_id,
            company,
            activity_type
        );
        Ok(template.clone())
    }

    /// The active default template for (company, activity type), if any
    pub fn get_active_template(
        &self,
        company: &CompanyId,
        activity_type: &ActivityType,
    ) -> Option<WorkflowTemplate> {
        self.read()
            .values()
            .find(|t| {
                &t.company == company
                    && &t.activity_type == activity_type
                    && t.is_default
                    && t.active
            })
            .cloned()
    }

    pub fn get_template(&self, template_id: &TemplateId) -> Option<WorkflowTemplate> {
        self.read().get(template_id).cloned()
    }

    /// All templates for (company, activity type), default first
    pub fn list_templates(
        &self,
        company: &CompanyId,
        activity_type: &ActivityType,
    ) -> Vec<WorkflowTemplate> {
        let mut templates: Vec<WorkflowTemplate> = self
            .read()
            .values()
            .filter(|t| &t.company == company && &t.activity_type == activity_type)
            .cloned()
            .collect();

        templates.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(a.name.cmp(&b.name)));
        templates
    }

    /// Append a step with the next order value
    pub fn add_step(&self, template_id: &TemplateId, step: NewStep) -> Result<StepDefinition> {
        step.validate()?;

        let mut templates = self.write();
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", template_id)))?;

        let definition = StepDefinition {
            id: StepId::new(),
            order: template.steps.len() as u32 + 1,
            name: step.name,
            approver: step.approver,
            required: step.required,
            skippable: step.skippable,
            auto_approve_after_days: step.auto_approve_after_days,
            condition: step.condition,
        };

        template.steps.push(definition.clone());
        template.updated_at = Utc::now();

        log::info!(
            "Added step {} '{}' to template {}",
            definition.order,
            definition.name,
            template_id
        );
        Ok(definition)
    }

    /// Replace a step's shape, keeping its id and order
    pub fn update_step(
        &self,
        template_id: &TemplateId,
        step_id: &StepId,
        step: NewStep,
    ) -> Result<StepDefinition> {
        step.validate()?;

        let mut templates = self.write();
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", template_id)))?;

        let existing = template
            .steps
            .iter_mut()
            .find(|s| &s.id == step_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("Step {} not found on template {}", step_id, template_id))
            })?;

        existing.name = step.name;
        existing.approver = step.approver;
        existing.required = step.required;
        existing.skippable = step.skippable;
        existing.auto_approve_after_days = step.auto_approve_after_days;
        existing.condition = step.condition;

        let updated = existing.clone();
        template.updated_at = Utc::now();

        log::info!("Updated step {} on template {}", step_id, template_id);
        Ok(updated)
    }

    /// Remove a step and renumber the remainder contiguously
    pub fn delete_step(&self, template_id: &TemplateId, step_id: &StepId) -> Result<()> {
        let mut templates = self.write();
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", template_id)))?;

        let before = template.steps.len();
        template.steps.retain(|s| &s.id != step_id);

        if template.steps.len() == before {
            return Err(EngineError::NotFound(format!(
                "Step {} not found on template {}",
                step_id, template_id
            )));
        }

        for (i, step) in template.steps.iter_mut().enumerate() {
            step.order = i as u32 + 1;
        }
        template.updated_at = Utc::now();

        log::info!("Deleted step {} from template {}", step_id, template_id);
        Ok(())
    }

    /// Reorder steps according to the full ordered id list
    ///
    /// The id set must exactly match the template's current steps; orders
    /// are reassigned contiguously 1..N.
    pub fn reorder_steps(
        &self,
        template_id: &TemplateId,
        ordered_step_ids: &[StepId],
    ) -> Result<WorkflowTemplate> {
        let mut templates = self.write();
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", template_id)))?;

        if ordered_step_ids.len() != template.steps.len() {
            return Err(EngineError::Validation(format!(
                "Reorder list has {} ids but template {} has {} steps",
                ordered_step_ids.len(),
                template_id,
                template.steps.len()
            )));
        }

        let mut reordered = Vec::with_capacity(template.steps.len());
        for (i, step_id) in ordered_step_ids.iter().enumerate() {
            let mut step = template
                .step(step_id)
                .cloned()
                .ok_or_else(|| {
                    EngineError::Validation(format!(
                        "Reorder list references step {} not on template {}",
                        step_id, template_id
                    ))
                })?;

            if reordered.iter().any(|s: &StepDefinition| s.id == step.id) {
                return Err(EngineError::Validation(format!(
                    "Reorder list repeats step {}",
                    step_id
                )));
            }

            step.order = i as u32 + 1;
            reordered.push(step);
        }

        template.steps = reordered;
        template.updated_at = Utc::now();

        log::info!("Reordered {} steps on template {}", ordered_step_ids.len(), template_id);
        Ok(template.clone())
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::PersonId;

    fn simple_step(name: &str) -> NewStep {
        NewStep {
            name: name.to_string(),
            approver: ApproverSpec::Person(PersonId::new("approver-1")),
            required: true,
            skippable: false,
            auto_approve_after_days: None,
            condition: None,
        }
    }

    fn store_with_template() -> (TemplateStore, WorkflowTemplate) {
        let store = TemplateStore::new();
        let template = store
            .create_template(
                CompanyId::new("acme"),
                ActivityType::new("leave_application"),
                "Standard leave".to_string(),
                None,
                vec![simple_step("Manager"), simple_step("HR")],
            )
            .unwrap();
        (store, template)
    }

    #[test]
    fn test_create_assigns_contiguous_orders() {
        let (_, template) = store_with_template();
        let orders: Vec<u32> = template.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn test_create_rejects_bad_condition() {
        let store = TemplateStore::new();
        let mut step = simple_step("Conditional");
        step.condition = Some("days >>> 3".to_string());

        let err = store
            .create_template(
                CompanyId::new("acme"),
                ActivityType::new("leave_application"),
                "Broken".to_string(),
                None,
                vec![step],
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_single_default_per_key() {
        let (store, first) = store_with_template();
        let second = store
            .create_template(
                first.company.clone(),
                first.activity_type.clone(),
                "Fast track".to_string(),
                None,
                vec![simple_step("CEO")],
            )
            .unwrap();

        store.set_as_default(&first.id).unwrap();
        store.set_as_default(&second.id).unwrap();

        let defaults: Vec<_> = store
            .list_templates(&first.company, &first.activity_type)
            .into_iter()
            .filter(|t| t.is_default)
            .collect();

        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
    }

    #[test]
    fn test_default_scoped_to_activity_type() {
        let (store, leave) = store_with_template();
        let expense = store
            .create_template(
                leave.company.clone(),
                ActivityType::new("expense_claim"),
                "Expenses".to_string(),
                None,
                vec![simple_step("Finance")],
            )
            .unwrap();

        store.set_as_default(&leave.id).unwrap();
        store.set_as_default(&expense.id).unwrap();

        assert!(store.get_template(&leave.id).unwrap().is_default);
        assert!(store.get_template(&expense.id).unwrap().is_default);
    }

    #[test]
    fn test_inactive_template_cannot_be_default() {
        let (store, template) = store_with_template();
        store
            .update_template(&template.id, template.name.clone(), None, false)
            .unwrap();

        let err = store.set_as_default(&template.id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_get_active_template_requires_active_default() {
        let (store, template) = store_with_template();
        assert!(store
            .get_active_template(&template.company, &template.activity_type)
            .is_none());

        store.set_as_default(&template.id).unwrap();
        assert!(store
            .get_active_template(&template.company, &template.activity_type)
            .is_some());

        store
            .update_template(&template.id, template.name.clone(), None, false)
            .unwrap();
        assert!(store
            .get_active_template(&template.company, &template.activity_type)
            .is_none());
    }

    #[test]
    fn test_delete_default_rejected() {
        let (store, template) = store_with_template();
        store.set_as_default(&template.id).unwrap();

        let err = store.delete_template(&template.id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // After a replacement default exists the old one can go
        let replacement = store
            .create_template(
                template.company.clone(),
                template.activity_type.clone(),
                "Replacement".to_string(),
                None,
                vec![simple_step("Manager")],
            )
            .unwrap();
        store.set_as_default(&replacement.id).unwrap();
        store.delete_template(&template.id).unwrap();

        assert!(store.get_template(&template.id).is_none());
    }

    #[test]
    fn test_delete_step_renumbers() {
        let (store, template) = store_with_template();
        let first = template.steps[0].id.clone();

        store.delete_step(&template.id, &first).unwrap();

        let template = store.get_template(&template.id).unwrap();
        assert_eq!(template.steps.len(), 1);
        assert_eq!(template.steps[0].order, 1);
        assert_eq!(template.steps[0].name, "HR");
    }

    #[test]
    fn test_reorder_steps() {
        let (store, template) = store_with_template();
        let ids: Vec<StepId> = template.steps.iter().rev().map(|s| s.id.clone()).collect();

        let reordered = store.reorder_steps(&template.id, &ids).unwrap();

        assert_eq!(reordered.steps[0].name, "HR");
        assert_eq!(reordered.steps[0].order, 1);
        assert_eq!(reordered.steps[1].name, "Manager");
        assert_eq!(reordered.steps[1].order, 2);
    }

    #[test]
    fn test_reorder_rejects_mismatched_set() {
        let (store, template) = store_with_template();

        // Too short
        let err = store
            .reorder_steps(&template.id, &[template.steps[0].id.clone()])
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Unknown id
        let err = store
            .reorder_steps(&template.id, &[template.steps[0].id.clone(), StepId::new()])
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Duplicate id
        let err = store
            .reorder_steps(
                &template.id,
                &[template.steps[0].id.clone(), template.steps[0].id.clone()],
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_add_step_appends_next_order() {
        let (store, template) = store_with_template();
        let added = store.add_step(&template.id, simple_step("Finance")).unwrap();
        assert_eq!(added.order, 3);
    }
}
