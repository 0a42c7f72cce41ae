use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockWriteGuard};

use crate::domain::estimate::{Estimate, EstimateId};
use crate::errors::DomainError;

/// Storage seam for estimates. Persistence itself belongs to an external collaborator; the
/// in-memory implementation below backs the CLI and tests.
///
/// Writes are conditional on the version the caller read. `expected_version: None` inserts only
/// when no estimate with that id exists yet.
pub trait EstimateRepository: Send + Sync {
    fn find_by_id(&self, id: &EstimateId) -> Option<Estimate>;
    fn save_if_version(
        &self,
        estimate: Estimate,
        expected_version: Option<u32>,
    ) -> Result<(), DomainError>;
    fn remove_if_version(
        &self,
        id: &EstimateId,
        expected_version: u32,
    ) -> Result<Estimate, DomainError>;
    fn list(&self) -> Vec<Estimate>;
}

#[derive(Default)]
pub struct InMemoryEstimateRepository {
    estimates: RwLock<BTreeMap<EstimateId, Estimate>>,
}

impl InMemoryEstimateRepository {
    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<EstimateId, Estimate>> {
        match self.estimates.write() {
            Ok(estimates) => estimates,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn conflict(stored: &Estimate, expected: u32) -> DomainError {
    DomainError::VersionConflict {
        id: stored.id().clone(),
        expected,
        found: stored.version(),
    }
}

impl EstimateRepository for InMemoryEstimateRepository {
    fn find_by_id(&self, id: &EstimateId) -> Option<Estimate> {
        match self.estimates.read() {
            Ok(estimates) => estimates.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        }
    }

    fn save_if_version(
        &self,
        estimate: Estimate,
        expected_version: Option<u32>,
    ) -> Result<(), DomainError> {
        let mut estimates = self.write();
        match (estimates.entry(estimate.id().clone()), expected_version) {
            (Entry::Vacant(slot), None) => {
                slot.insert(estimate);
                Ok(())
            }
            (Entry::Vacant(slot), Some(_)) => {
                Err(DomainError::not_found("estimate", slot.key().0.clone()))
            }
            (Entry::Occupied(slot), None) => Err(DomainError::Validation(format!(
                "estimate `{}` already exists",
                slot.key().0
            ))),
            (Entry::Occupied(mut slot), Some(expected)) => {
                if slot.get().version() != expected {
                    return Err(conflict(slot.get(), expected));
                }
                slot.insert(estimate);
                Ok(())
            }
        }
    }

    fn remove_if_version(
        &self,
        id: &EstimateId,
        expected_version: u32,
    ) -> Result<Estimate, DomainError> {
        let mut estimates = self.write();
        match estimates.get(id) {
            None => Err(DomainError::not_found("estimate", id.0.clone())),
            Some(stored) if stored.version() != expected_version => {
                Err(conflict(stored, expected_version))
            }
            Some(_) => estimates
                .remove(id)
                .ok_or_else(|| DomainError::not_found("estimate", id.0.clone())),
        }
    }

    fn list(&self) -> Vec<Estimate> {
        match self.estimates.read() {
            Ok(estimates) => estimates.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }
}
