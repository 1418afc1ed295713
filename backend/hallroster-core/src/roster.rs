// src/roster.rs
use serde::Serialize;
use tracing::debug;

use crate::model::{Employee, Hall};
use crate::store::{fetch_all, DocumentStore, StoreError};

/// In-memory copy of both collections held by a view. It is refreshed from
/// the store or from a successful command's outcome, never edited ahead of
/// a confirmed write.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RosterSnapshot {
    pub employees: Vec<Employee>,
    pub halls: Vec<Hall>,
}

impl RosterSnapshot {
    /// Re-fetches both collections in full.
    pub async fn load(store: &dyn DocumentStore) -> Result<Self, StoreError> {
        let employees = fetch_all::<Employee>(store).await?;
        let halls = fetch_all::<Hall>(store).await?;
        debug!(
            "Loaded roster: {} employee(s), {} hall(s)",
            employees.len(),
            halls.len()
        );
        Ok(Self { employees, halls })
    }

    pub fn employee(&self, id: &str) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::reconcile::{CommandOutcome, ReconciliationEngine};
    use crate::store::{Collection, Record};
    use chrono::NaiveDate;
    use std::sync::Arc;

    /// Replaces the records a command returned, the way a client view
    /// refreshes from an outcome.
    fn apply(view: &mut RosterSnapshot, outcome: &CommandOutcome) {
        if let Some(employee) = &outcome.employee {
            match view.employees.iter_mut().find(|e| e.id == employee.id) {
                Some(slot) => *slot = employee.clone(),
                None => view.employees.push(employee.clone()),
            }
        }
        for hall in &outcome.halls {
            match view.halls.iter_mut().find(|h| h.id == hall.id) {
                Some(slot) => *slot = hall.clone(),
                None => view.halls.push(hall.clone()),
            }
        }
    }

    #[tokio::test]
    async fn applied_outcomes_match_a_fresh_load() {
        let store = MemoryStore::new();
        let employee = Employee {
            id: "e1".into(),
            name: "Dana".into(),
            ..Default::default()
        };
        let hall = Hall {
            id: "h1".into(),
            name: "North".into(),
            ..Default::default()
        };
        store
            .seed(Collection::Employees, "e1", employee.to_fields().unwrap())
            .await;
        store
            .seed(Collection::Halls, "h1", hall.to_fields().unwrap())
            .await;

        let mut view = RosterSnapshot::load(&store).await.unwrap();
        let engine = ReconciliationEngine::new(Arc::new(store.clone()));
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        apply(&mut view, &engine.toggle_attendance("e1", date).await.unwrap());
        apply(&mut view, &engine.assign_hall("e1", date, "h1").await.unwrap());

        assert_eq!(view, RosterSnapshot::load(&store).await.unwrap());
        assert_eq!(view.halls[0].working_days, 1);
    }

    #[tokio::test]
    async fn failed_commands_leave_the_view_alone() {
        let store = MemoryStore::new();
        let employee = Employee {
            id: "e1".into(),
            ..Default::default()
        };
        store
            .seed(Collection::Employees, "e1", employee.to_fields().unwrap())
            .await;
        let view = RosterSnapshot::load(&store).await.unwrap();
        let before = view.clone();

        let engine = ReconciliationEngine::new(Arc::new(store.clone()));
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(engine.assign_hall("e1", date, "h1").await.is_err());
        assert_eq!(view, before);
        assert!(view.employee("e1").unwrap().attendance.is_empty());
    }
}
