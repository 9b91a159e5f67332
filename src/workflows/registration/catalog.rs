use std::sync::Arc;

use super::domain::{Status, StatusCode};
use super::repository::{RegistrationStore, RepositoryError};

/// Seed rows written when a store is first opened: (order, code, label, color).
pub const DEFAULT_STATUSES: &[(i32, &str, &str, &str)] = &[
    (1, "RECU", "Reçu", "#17a2b8"),
    (2, "A_TRAITER", "À traiter", "#007bff"),
    (3, "INCOMPLET", "Dossier incomplet", "#ffc107"),
    (4, "EN_ATTENTE", "En attente", "#6c757d"),
    (5, "VALIDE", "Validée", "#28a745"),
    (6, "REFUSE", "Refusée", "#dc3545"),
    (7, "AUTRE", "Autres", "#6c757d"),
    (8, "ABANDONNE", "Abandonné", "#6c757d"),
    (9, "TERMINE", "Terminé", "#28a745"),
    (10, "ARCHIVE", "Archivé", "#343a40"),
];

/// Read access to the ordered status catalog.
pub struct StatusCatalog<S> {
    store: Arc<S>,
}

impl<S> StatusCatalog<S>
where
    S: RegistrationStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Statuses ascending by order, ties broken by code.
    pub fn list(&self, active_only: bool) -> Result<Vec<Status>, RepositoryError> {
        let mut statuses = self.store.list_statuses(active_only)?;
        sort_statuses(&mut statuses);
        Ok(statuses)
    }

    pub fn resolve(&self, code: &StatusCode) -> Result<Status, RepositoryError> {
        self.store
            .fetch_status(code)?
            .ok_or(RepositoryError::NotFound)
    }

    /// Lowest-order active status, assigned to fresh applications.
    pub fn default_status(&self) -> Result<Status, RepositoryError> {
        self.list(true)?
            .into_iter()
            .next()
            .ok_or(RepositoryError::NotFound)
    }

    /// Retires or restores a status without touching historical references.
    pub fn set_active(&self, code: &StatusCode, active: bool) -> Result<(), RepositoryError> {
        self.store.set_status_active(code, active)
    }
}

pub(crate) fn sort_statuses(statuses: &mut [Status]) {
    statuses.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.code.cmp(&b.code)));
}
