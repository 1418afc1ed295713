// src/reconcile.rs
//
// Every change to attendance, per-day hall assignment or car availability
// goes through `ReconciliationEngine`. A command reads all the documents it
// needs first, computes the new employee and hall records in memory, then
// persists them as independent single-document writes in a fixed order:
// employee, old hall, new hall.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{day_key, Employee, Hall};
use crate::store::{
    fetch_one, select_fields, DocRef, DocumentStore, Fields, Record, SharedStore, StoreError,
};

const ATTENDANCE_FIELDS: &[&str] = &["attendance", "workingDays", "dailyHalls"];
const CAR_FIELDS: &[&str] = &["carAvailability"];
const DAILY_HALL_FIELDS: &[&str] = &["dailyHalls"];
const EMPLOYEE_HISTORY_FIELDS: &[&str] =
    &["workingDays", "attendance", "dailyHalls", "carAvailability"];
const HALL_AGGREGATE_FIELDS: &[&str] = &["workingDays", "employees", "employeeDates"];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("employee {0} not found")]
    EmployeeNotFound(String),

    #[error("hall {0} not found")]
    HallNotFound(String),

    #[error("employee {employee_id} is not marked as working on {date}")]
    NotAttending { employee_id: String, date: NaiveDate },

    #[error("failed to read current state: {0}")]
    Read(#[source] StoreError),

    #[error("write to {failed} failed after {} committed write(s): {source}", committed.len())]
    Store {
        failed: DocRef,
        committed: Vec<DocRef>,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    /// Message suitable for showing to the person who issued the command.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::EmployeeNotFound(_) => {
                "The employee no longer exists. Reload the list and try again.".to_string()
            }
            EngineError::HallNotFound(id) => format!(
                "Hall {} no longer exists. Reload the list and try again.",
                id
            ),
            EngineError::NotAttending { date, .. } => format!(
                "Mark the employee as working on {} before choosing a hall.",
                date.format("%d/%m/%Y")
            ),
            EngineError::Read(_) => {
                "Could not load the current data. Nothing was changed; please retry.".to_string()
            }
            EngineError::Store { committed, .. } if committed.is_empty() => {
                "Saving failed. Nothing was changed; please retry.".to_string()
            }
            EngineError::Store { committed, .. } => format!(
                "Saving failed part way: {} was already saved. Reload before retrying; \
                 the hall totals may need a reset.",
                committed
                    .iter()
                    .map(DocRef::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Whether any document was changed before the failure.
    pub fn has_partial_effect(&self) -> bool {
        matches!(self, EngineError::Store { committed, .. } if !committed.is_empty())
    }
}

/// Post-command snapshots of every record the command touched. Callers replace
/// their in-memory copies with these; nothing is returned on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub employee: Option<Employee>,
    pub halls: Vec<Hall>,
}

/// Ordered list of single-document writes belonging to one command.
#[derive(Default)]
struct WritePlan {
    writes: Vec<(DocRef, Fields)>,
}

impl WritePlan {
    fn push<R: Record>(&mut self, record: &R, names: &[&str]) -> Result<(), EngineError> {
        let fields = select_fields(record, names).map_err(|source| EngineError::Store {
            failed: record.doc_ref(),
            committed: Vec::new(),
            source,
        })?;
        self.writes.push((record.doc_ref(), fields));
        Ok(())
    }

    async fn commit(self, store: &dyn DocumentStore) -> Result<Vec<DocRef>, EngineError> {
        let mut committed = Vec::with_capacity(self.writes.len());
        for (doc, fields) in self.writes {
            debug!("Writing {} ({} field(s))", doc, fields.len());
            if let Err(source) = store.update_fields(doc.collection, &doc.id, fields).await {
                error!(
                    "Write to {} failed; already committed: {:?}",
                    doc,
                    committed.iter().map(DocRef::to_string).collect::<Vec<_>>()
                );
                return Err(EngineError::Store {
                    failed: doc,
                    committed,
                    source,
                });
            }
            committed.push(doc);
        }
        Ok(committed)
    }
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: SharedStore,
}

impl ReconciliationEngine {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    async fn load_employee(&self, employee_id: &str) -> Result<Employee, EngineError> {
        fetch_one::<Employee>(self.store.as_ref(), employee_id)
            .await
            .map_err(EngineError::Read)?
            .ok_or_else(|| EngineError::EmployeeNotFound(employee_id.to_string()))
    }

    async fn load_hall(&self, hall_id: &str) -> Result<Hall, EngineError> {
        fetch_one::<Hall>(self.store.as_ref(), hall_id)
            .await
            .map_err(EngineError::Read)?
            .ok_or_else(|| EngineError::HallNotFound(hall_id.to_string()))
    }

    /// Loads the hall a stored `dailyHalls` entry points at. Halls can be
    /// deleted without touching employees, so a missing one only skips its
    /// aggregate step.
    async fn load_previous_hall(
        &self,
        employee_id: &str,
        hall_id: &str,
    ) -> Result<Option<Hall>, EngineError> {
        let hall = fetch_one::<Hall>(self.store.as_ref(), hall_id)
            .await
            .map_err(EngineError::Read)?;
        if hall.is_none() {
            warn!(
                "Hall {} recorded for {} no longer exists; skipping its aggregates",
                hall_id, employee_id
            );
        }
        Ok(hall)
    }

    /// Logs the result of a command at its boundary.
    fn finish(
        command: &str,
        result: Result<CommandOutcome, EngineError>,
    ) -> Result<CommandOutcome, EngineError> {
        match &result {
            Ok(outcome) => info!(
                "{} completed (employee: {}, halls: {})",
                command,
                outcome
                    .employee
                    .as_ref()
                    .map(|e| e.id.as_str())
                    .unwrap_or("-"),
                outcome
                    .halls
                    .iter()
                    .map(|h| h.id.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Err(e @ EngineError::NotAttending { .. }) => warn!("{} rejected: {}", command, e),
            Err(e) => error!("{} failed: {}", command, e),
        }
        result
    }

    /// Flips `attendance[date]`. Turning a day off also takes the day off the
    /// hall recorded in `dailyHalls[date]`, if that hall still exists, and
    /// clears that override.
    pub async fn toggle_attendance(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<CommandOutcome, EngineError> {
        info!("Toggling attendance for {} on {}", employee_id, date);
        let result = self.toggle_attendance_inner(employee_id, date).await;
        Self::finish("toggle-attendance", result)
    }

    async fn toggle_attendance_inner(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<CommandOutcome, EngineError> {
        let day = day_key(date);
        let mut employee = self.load_employee(employee_id).await?;

        if !employee.is_attending(&day) {
            employee.attendance.insert(day, true);
            employee.working_days += 1;

            let mut plan = WritePlan::default();
            plan.push(&employee, ATTENDANCE_FIELDS)?;
            plan.commit(self.store.as_ref()).await?;
            return Ok(CommandOutcome {
                employee: Some(employee),
                halls: Vec::new(),
            });
        }

        let mut hall = match employee.hall_override(&day) {
            Some(hall_id) => self.load_previous_hall(&employee.id, hall_id).await?,
            None => None,
        };

        employee.attendance.insert(day.clone(), false);
        employee.working_days = employee.working_days.saturating_sub(1);
        employee.daily_halls.remove(&day);
        if let Some(hall) = hall.as_mut() {
            hall.remove_assignment_day(&employee.id, &day);
        }

        let mut plan = WritePlan::default();
        plan.push(&employee, ATTENDANCE_FIELDS)?;
        if let Some(hall) = &hall {
            plan.push(hall, HALL_AGGREGATE_FIELDS)?;
        }
        plan.commit(self.store.as_ref()).await?;

        Ok(CommandOutcome {
            employee: Some(employee),
            halls: hall.into_iter().collect(),
        })
    }

    /// Flips `carAvailability[date]`. Attendance is not consulted.
    pub async fn toggle_car(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<CommandOutcome, EngineError> {
        info!("Toggling car availability for {} on {}", employee_id, date);
        let result = async {
            let day = day_key(date);
            let mut employee = self.load_employee(employee_id).await?;
            let had_car = employee.has_car(&day);
            employee.car_availability.insert(day, !had_car);

            let mut plan = WritePlan::default();
            plan.push(&employee, CAR_FIELDS)?;
            plan.commit(self.store.as_ref()).await?;
            Ok::<_, EngineError>(CommandOutcome {
                employee: Some(employee),
                halls: Vec::new(),
            })
        }
        .await;
        Self::finish("toggle-car", result)
    }

    /// Records that the employee worked `date` at `hall_id`. An empty
    /// `hall_id` clears the day's hall. The employee must be attending.
    pub async fn assign_hall(
        &self,
        employee_id: &str,
        date: NaiveDate,
        hall_id: &str,
    ) -> Result<CommandOutcome, EngineError> {
        info!(
            "Assigning hall '{}' to {} on {}",
            hall_id, employee_id, date
        );
        let result = self.assign_hall_inner(employee_id, date, hall_id.trim()).await;
        Self::finish("assign-hall", result)
    }

    async fn assign_hall_inner(
        &self,
        employee_id: &str,
        date: NaiveDate,
        hall_id: &str,
    ) -> Result<CommandOutcome, EngineError> {
        let day = day_key(date);
        let mut employee = self.load_employee(employee_id).await?;
        if !employee.is_attending(&day) {
            return Err(EngineError::NotAttending {
                employee_id: employee.id,
                date,
            });
        }

        let old_hall_id = employee.hall_override(&day).map(str::to_string);
        let mut new_hall = if hall_id.is_empty() {
            None
        } else {
            Some(self.load_hall(hall_id).await?)
        };

        if old_hall_id.as_deref().unwrap_or("") == hall_id {
            debug!("{} already recorded at '{}' on {}", employee.id, hall_id, day);
            return Ok(CommandOutcome {
                employee: Some(employee),
                halls: new_hall.into_iter().collect(),
            });
        }

        let mut old_hall = match &old_hall_id {
            Some(id) => self.load_previous_hall(&employee.id, id).await?,
            None => None,
        };

        if let Some(hall) = old_hall.as_mut() {
            hall.remove_assignment_day(&employee.id, &day);
        }
        if let Some(hall) = new_hall.as_mut() {
            hall.add_assignment_day(&employee.id, &employee.name, &day);
        }
        if hall_id.is_empty() {
            employee.daily_halls.remove(&day);
        } else {
            employee.daily_halls.insert(day, hall_id.to_string());
        }

        let mut plan = WritePlan::default();
        plan.push(&employee, DAILY_HALL_FIELDS)?;
        if let Some(hall) = &old_hall {
            plan.push(hall, HALL_AGGREGATE_FIELDS)?;
        }
        if let Some(hall) = &new_hall {
            plan.push(hall, HALL_AGGREGATE_FIELDS)?;
        }
        plan.commit(self.store.as_ref()).await?;

        Ok(CommandOutcome {
            employee: Some(employee),
            halls: old_hall.into_iter().chain(new_hall).collect(),
        })
    }

    /// Zeroes a hall's aggregates. Employee records are left as they are.
    pub async fn reset_hall(&self, hall_id: &str) -> Result<CommandOutcome, EngineError> {
        info!("Resetting aggregates of hall {}", hall_id);
        let result = async {
            let mut hall = self.load_hall(hall_id).await?;
            hall.reset_aggregates();

            let mut plan = WritePlan::default();
            plan.push(&hall, HALL_AGGREGATE_FIELDS)?;
            plan.commit(self.store.as_ref()).await?;
            Ok::<_, EngineError>(CommandOutcome {
                employee: None,
                halls: vec![hall],
            })
        }
        .await;
        Self::finish("reset-hall", result)
    }

    /// Clears an employee's per-day history. Hall aggregates that counted
    /// these days are left as they are.
    pub async fn reset_employee(&self, employee_id: &str) -> Result<CommandOutcome, EngineError> {
        info!("Resetting history of employee {}", employee_id);
        let result = async {
            let mut employee = self.load_employee(employee_id).await?;
            employee.working_days = 0;
            employee.attendance.clear();
            employee.daily_halls.clear();
            employee.car_availability.clear();

            let mut plan = WritePlan::default();
            plan.push(&employee, EMPLOYEE_HISTORY_FIELDS)?;
            plan.commit(self.store.as_ref()).await?;
            Ok::<_, EngineError>(CommandOutcome {
                employee: Some(employee),
                halls: Vec::new(),
            })
        }
        .await;
        Self::finish("reset-employee", result)
    }
}
