// src/directory.rs
//
// Plain CRUD over employees and halls. Edits only ever carry identity and
// contact fields; per-day maps and aggregate counters belong to the
// reconciliation engine and are never written from here.

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::model::{Employee, Hall};
use crate::store::{
    fetch_all, fetch_one, select_fields, Collection, Record, SharedStore, StoreError,
};

const EMPLOYEE_EDIT_FIELDS: &[&str] = &["name", "contactNumber", "email", "assignedHall"];
const HALL_EDIT_FIELDS: &[&str] = &["name", "location"];

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("{0}")]
    Validation(String),

    #[error("an employee named '{0}' already exists")]
    DuplicateName(String),

    #[error("{collection} document {id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

/// Editable employee fields, as submitted by a form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub assigned_hall: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HallDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct Directory {
    store: SharedStore,
}

impl Directory {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    // --- Employees ---

    pub async fn list_employees(&self) -> Result<Vec<Employee>, DirectoryError> {
        Ok(fetch_all::<Employee>(self.store.as_ref()).await?)
    }

    pub async fn get_employee(&self, id: &str) -> Result<Employee, DirectoryError> {
        fetch_one::<Employee>(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| DirectoryError::NotFound {
                collection: Collection::Employees,
                id: id.to_string(),
            })
    }

    /// Rejects an empty name or one already used by another employee
    /// (case-insensitive).
    async fn check_employee_name(
        &self,
        name: &str,
        editing_id: Option<&str>,
    ) -> Result<(), DirectoryError> {
        if name.is_empty() {
            return Err(DirectoryError::Validation("Name is required.".to_string()));
        }
        let wanted = name.to_lowercase();
        let taken = self
            .list_employees()
            .await?
            .into_iter()
            .any(|e| e.name.trim().to_lowercase() == wanted && Some(e.id.as_str()) != editing_id);
        if taken {
            return Err(DirectoryError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    pub async fn create_employee(&self, draft: EmployeeDraft) -> Result<Employee, DirectoryError> {
        let name = draft.name.trim().to_string();
        self.check_employee_name(&name, None).await?;

        let mut employee = Employee {
            name,
            contact_number: non_empty(draft.contact_number),
            email: non_empty(draft.email),
            assigned_hall: non_empty(draft.assigned_hall),
            ..Default::default()
        };
        employee.id = self
            .store
            .create_one(Collection::Employees, employee.to_fields()?)
            .await
            .map_err(|e| {
                error!("Failed to create employee '{}': {}", employee.name, e);
                e
            })?;
        info!("Created employee {} ('{}')", employee.id, employee.name);
        Ok(employee)
    }

    pub async fn update_employee(
        &self,
        id: &str,
        draft: EmployeeDraft,
    ) -> Result<Employee, DirectoryError> {
        let mut employee = self.get_employee(id).await?;
        let name = draft.name.trim().to_string();
        self.check_employee_name(&name, Some(id)).await?;

        employee.name = name;
        employee.contact_number = non_empty(draft.contact_number);
        employee.email = non_empty(draft.email);
        employee.assigned_hall = non_empty(draft.assigned_hall);
        self.store
            .update_fields(
                Collection::Employees,
                id,
                select_fields(&employee, EMPLOYEE_EDIT_FIELDS)?,
            )
            .await?;
        info!("Updated employee {}", id);
        Ok(employee)
    }

    /// Hall aggregates that counted this employee are left untouched.
    pub async fn delete_employee(&self, id: &str) -> Result<(), DirectoryError> {
        self.store
            .delete_one(Collection::Employees, id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => DirectoryError::NotFound {
                    collection: Collection::Employees,
                    id: id.to_string(),
                },
                other => DirectoryError::Store(other),
            })?;
        info!("Deleted employee {}", id);
        Ok(())
    }

    /// Stored verbatim; parsing happens when payroll is computed.
    pub async fn set_daily_rate(&self, id: &str, rate: &str) -> Result<Employee, DirectoryError> {
        let mut employee = self.get_employee(id).await?;
        employee.daily_rate = Some(rate.trim().to_string());
        self.store
            .update_fields(
                Collection::Employees,
                id,
                select_fields(&employee, &["dailyRate"])?,
            )
            .await?;
        info!("Set daily rate of {} to '{}'", id, rate.trim());
        Ok(employee)
    }

    pub async fn set_comment(&self, id: &str, comment: &str) -> Result<Employee, DirectoryError> {
        let mut employee = self.get_employee(id).await?;
        employee.comment = Some(comment.to_string());
        self.store
            .update_fields(
                Collection::Employees,
                id,
                select_fields(&employee, &["comment"])?,
            )
            .await?;
        info!("Updated comment of {}", id);
        Ok(employee)
    }

    // --- Halls ---

    pub async fn list_halls(&self) -> Result<Vec<Hall>, DirectoryError> {
        Ok(fetch_all::<Hall>(self.store.as_ref()).await?)
    }

    pub async fn get_hall(&self, id: &str) -> Result<Hall, DirectoryError> {
        fetch_one::<Hall>(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| DirectoryError::NotFound {
                collection: Collection::Halls,
                id: id.to_string(),
            })
    }

    fn validate_hall(draft: &HallDraft) -> Result<(String, String), DirectoryError> {
        let name = draft.name.trim();
        let location = draft.location.trim();
        if name.is_empty() || location.is_empty() {
            return Err(DirectoryError::Validation(
                "Hall name and location are required.".to_string(),
            ));
        }
        Ok((name.to_string(), location.to_string()))
    }

    /// New halls start with zero days and no employees.
    pub async fn create_hall(&self, draft: HallDraft) -> Result<Hall, DirectoryError> {
        let (name, location) = Self::validate_hall(&draft)?;
        let mut hall = Hall {
            name,
            location,
            ..Default::default()
        };
        hall.id = self
            .store
            .create_one(Collection::Halls, hall.to_fields()?)
            .await?;
        info!("Created hall {} ('{}')", hall.id, hall.name);
        Ok(hall)
    }

    pub async fn update_hall(&self, id: &str, draft: HallDraft) -> Result<Hall, DirectoryError> {
        let (name, location) = Self::validate_hall(&draft)?;
        let mut hall = self.get_hall(id).await?;
        hall.name = name;
        hall.location = location;
        self.store
            .update_fields(Collection::Halls, id, select_fields(&hall, HALL_EDIT_FIELDS)?)
            .await?;
        info!("Updated hall {}", id);
        Ok(hall)
    }

    /// Employees still referencing this hall keep their references.
    pub async fn delete_hall(&self, id: &str) -> Result<(), DirectoryError> {
        self.store
            .delete_one(Collection::Halls, id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => DirectoryError::NotFound {
                    collection: Collection::Halls,
                    id: id.to_string(),
                },
                other => DirectoryError::Store(other),
            })?;
        info!("Deleted hall {}", id);
        Ok(())
    }
}
