//! Shared types for the approval workflow engine
//!
//! Strongly typed identifiers and state enums - no string-based state
//! management anywhere in the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Strongly typed company identifier (tenant key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(String);

impl CompanyId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed person identifier from the org directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(String);

impl PersonId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Activity type discriminator ("leave_application", "asset_request", ...)
///
/// Owned by the domain modules; the engine only uses it as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityType(String);

impl ActivityType {
    pub fn new<S: Into<String>>(ty: S) -> Self {
        Self(ty.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the domain record awaiting approval
///
/// A soft foreign key into the owning domain module, never validated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(String);

impl ActivityId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed workflow template identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| format!("Invalid TemplateId format: {}", e))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed step definition identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| format!("Invalid StepId format: {}", e))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed approval request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| format!("Invalid RequestId format: {}", e))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request-level lifecycle state
///
/// Transitions are one-way: Pending -> Approved | Rejected | Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Step-level lifecycle state
///
/// Transitions are one-way: Pending -> Approved | Rejected | Skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Abstract approver specification on a step definition
///
/// Resolved into a concrete [`Assignee`] exactly once, at request creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverSpec {
    /// Any holder of the named role in the request's company
    Role(String),
    /// A specific person
    Person(PersonId),
    /// The org-hierarchy manager of the requestor
    RequestorManager,
}

impl fmt::Display for ApproverSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(role) => write!(f, "role:{}", role),
            Self::Person(person) => write!(f, "person:{}", person),
            Self::RequestorManager => write!(f, "requestor_manager"),
        }
    }
}

/// Concrete assignee materialized by the step resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assignee {
    /// Assigned to one person
    Person(PersonId),
    /// Assigned to a role; any holder may act, first action wins
    Role(String),
}

impl Assignee {
    pub fn is_person(&self, person: &PersonId) -> bool {
        matches!(self, Self::Person(p) if p == person)
    }
}

impl fmt::Display for Assignee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Person(person) => write!(f, "{}", person),
            Self::Role(role) => write!(f, "role:{}", role),
        }
    }
}

/// A single value in the activity attribute bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

/// One step of a workflow template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    /// Unique and contiguous within the template, starting at 1
    pub order: u32,
    pub name: String,
    pub approver: ApproverSpec,
    pub required: bool,
    pub skippable: bool,
    /// Escalation deadline in days; None disables auto-approval
    pub auto_approve_after_days: Option<u32>,
    /// Predicate over the activity attribute bag; None means always applies
    pub condition: Option<String>,
}

/// A named, ordered approval workflow for one (company, activity type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub company: CompanyId,
    pub activity_type: ActivityType,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub is_default: bool,
    pub steps: Vec<StepDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn step(&self, step_id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| &s.id == step_id)
    }
}

/// Immutable-shape snapshot of a step definition inside a request
///
/// The shape is frozen at request creation; only status, actor, timestamp
/// and comments mutate afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStep {
    pub order: u32,
    pub name: String,
    pub approver: ApproverSpec,
    pub assignee: Option<Assignee>,
    pub status: StepStatus,
    pub acted_by: Option<PersonId>,
    pub acted_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub auto_approve_after_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl RequestStep {
    /// Deadline after which the sweeper may force this step through
    pub fn auto_approve_deadline(&self) -> Option<DateTime<Utc>> {
        self.auto_approve_after_days
            .map(|days| self.created_at + chrono::Duration::days(i64::from(days)))
    }
}

/// One workflow instance for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub company: CompanyId,
    pub activity_type: ActivityType,
    pub activity_id: ActivityId,
    /// Denormalized for display in pending-approval listings
    pub activity_title: String,
    pub requestor: PersonId,
    pub template_id: TemplateId,
    /// Index into `steps`; None once the request is terminal
    pub current_step: Option<usize>,
    pub total_steps: u32,
    pub status: RequestStatus,
    pub steps: Vec<RequestStep>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    /// The step currently blocking the request, if any
    pub fn active_step(&self) -> Option<&RequestStep> {
        self.current_step.and_then(|i| self.steps.get(i))
    }
}

/// Inbound activity descriptor handed to the engine by a domain module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub company: CompanyId,
    pub activity_type: ActivityType,
    pub activity_id: ActivityId,
    pub title: String,
    pub requestor: PersonId,
    /// Fixed attribute bag snapshotted at start for condition evaluation
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

/// Denormalized row returned by the pending-approvals query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub request_id: RequestId,
    pub company: CompanyId,
    pub activity_type: ActivityType,
    pub activity_id: ActivityId,
    pub activity_title: String,
    pub requestor: PersonId,
    pub step_order: u32,
    pub step_name: String,
    pub assignee: Assignee,
    pub requested_at: DateTime<Utc>,
}
