use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{CombinationRule, Part, PartId, Service, ServiceId};
use crate::errors::DomainError;

/// Collections handed over by the catalog collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub rules: Vec<CombinationRule>,
}

impl CatalogSnapshot {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CatalogEntry<'a> {
    Part(&'a Part),
    Service(&'a Service),
}

impl CatalogEntry<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Part(part) => &part.name,
            Self::Service(service) => &service.name,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::Part(part) => part.active,
            Self::Service(service) => service.active,
        }
    }
}

/// Anything the catalog can filter and search.
pub trait CatalogItem {
    fn is_active(&self) -> bool;
    fn search_fields(&self) -> [Option<&str>; 4];
}

impl CatalogItem for Part {
    fn is_active(&self) -> bool {
        self.active
    }

    fn search_fields(&self) -> [Option<&str>; 4] {
        [
            Some(self.name.as_str()),
            Some(self.sku.as_str()),
            Some(self.category.as_str()),
            self.model_number.as_deref(),
        ]
    }
}

impl CatalogItem for Service {
    fn is_active(&self) -> bool {
        self.active
    }

    fn search_fields(&self) -> [Option<&str>; 4] {
        [Some(self.name.as_str()), None, Some(self.unit.as_str()), self.description.as_deref()]
    }
}

impl CatalogItem for CombinationRule {
    fn is_active(&self) -> bool {
        self.active
    }

    fn search_fields(&self) -> [Option<&str>; 4] {
        [Some(self.name.as_str()), Some(self.id.0.as_str()), None, None]
    }
}

pub fn filter_active<T: CatalogItem>(items: &[T]) -> Vec<&T> {
    items.iter().filter(|item| item.is_active()).collect()
}

pub fn search<'a, T: CatalogItem>(items: &'a [T], term: &str) -> Vec<&'a T> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return items.iter().collect();
    }

    items
        .iter()
        .filter(|item| {
            item.search_fields()
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Read-only index over parts, services and combination rules.
#[derive(Clone, Debug, Default)]
pub struct CatalogIndex {
    parts: Vec<Part>,
    services: Vec<Service>,
    rules: Vec<CombinationRule>,
}

impl CatalogIndex {
    pub fn new(parts: Vec<Part>, services: Vec<Service>) -> Self {
        Self { parts, services, rules: Vec::new() }
    }

    pub fn with_rules(mut self, rules: Vec<CombinationRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self::new(snapshot.parts, snapshot.services).with_rules(snapshot.rules)
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn rules(&self) -> &[CombinationRule] {
        &self.rules
    }

    /// Looks up parts first, then services.
    pub fn find_by_id(&self, id: &str) -> Result<CatalogEntry<'_>, DomainError> {
        if let Some(part) = self.parts.iter().find(|part| part.id.0 == id) {
            return Ok(CatalogEntry::Part(part));
        }
        if let Some(service) = self.services.iter().find(|service| service.id.0 == id) {
            return Ok(CatalogEntry::Service(service));
        }

        Err(DomainError::not_found("catalog entry", id))
    }

    pub fn find_part(&self, id: &PartId) -> Result<&Part, DomainError> {
        self.parts
            .iter()
            .find(|part| &part.id == id)
            .ok_or_else(|| DomainError::not_found("part", id.0.clone()))
    }

    pub fn find_service(&self, id: &ServiceId) -> Result<&Service, DomainError> {
        self.services
            .iter()
            .find(|service| &service.id == id)
            .ok_or_else(|| DomainError::not_found("service", id.0.clone()))
    }

    pub fn active_parts(&self) -> Vec<&Part> {
        filter_active(&self.parts)
    }

    pub fn active_services(&self) -> Vec<&Service> {
        filter_active(&self.services)
    }

    pub fn active_rules(&self) -> Vec<&CombinationRule> {
        filter_active(&self.rules)
    }

    pub fn categories(&self) -> Vec<String> {
        self.parts
            .iter()
            .filter(|part| part.active)
            .map(|part| part.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn search_parts(&self, term: &str) -> Vec<&Part> {
        search(&self.parts, term)
    }

    pub fn search_services(&self, term: &str) -> Vec<&Service> {
        search(&self.services, term)
    }
}
