//! Org directory seam used by the step resolver
//!
//! The engine never owns people, roles or reporting lines; it asks this
//! trait. Production deployments back it with the platform's HR store,
//! tests and the bundled server use [`StaticDirectory`].

use crate::config::EngineConfig;
use crate::error::Result;
use approval_types::{CompanyId, PersonId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Lookup interface into the organisation hierarchy
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    /// Every person holding the named role in the company
    async fn role_holders(&self, company: &CompanyId, role: &str) -> Result<Vec<PersonId>>;

    /// Whether one person holds the named role in the company
    async fn holds_role(&self, company: &CompanyId, person: &PersonId, role: &str) -> Result<bool> {
        Ok(self.role_holders(company, role).await?.contains(person))
    }

    /// The person's manager, if the org chart has one
    async fn manager_of(&self, company: &CompanyId, person: &PersonId)
        -> Result<Option<PersonId>>;
}

#[derive(Debug, Clone, Default)]
struct PersonRecord {
    manager: Option<PersonId>,
    roles: Vec<String>,
}

/// In-memory org directory built once at startup
#[derive(Debug, Default)]
pub struct StaticDirectory {
    people: HashMap<(CompanyId, PersonId), PersonRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the directory from the engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut directory = Self::new();

        for company in &config.directory {
            let company_id = CompanyId::new(company.id.clone());
            for person in &company.people {
                directory.add_person(
                    company_id.clone(),
                    PersonId::new(person.id.clone()),
                    person.manager.clone().map(PersonId::new),
                    person.roles.clone(),
                );
            }
        }

        directory
    }

    pub fn add_person(
        &mut self,
        company: CompanyId,
        person: PersonId,
        manager: Option<PersonId>,
        roles: Vec<String>,
    ) {
        self.people
            .insert((company, person), PersonRecord { manager, roles });
    }
}

#[async_trait]
impl OrgDirectory for StaticDirectory {
    async fn role_holders(&self, company: &CompanyId, role: &str) -> Result<Vec<PersonId>> {
        let mut holders: Vec<PersonId> = self
            .people
            .iter()
            .filter(|((c, _), record)| c == company && record.roles.iter().any(|r| r == role))
            .map(|((_, p), _)| p.clone())
            .collect();

        // Deterministic ordering keeps role listings stable across calls
        holders.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(holders)
    }

    async fn manager_of(
        &self,
        company: &CompanyId,
        person: &PersonId,
    ) -> Result<Option<PersonId>> {
        Ok(self
            .people
            .get(&(company.clone(), person.clone()))
            .and_then(|record| record.manager.clone()))
    }
}
