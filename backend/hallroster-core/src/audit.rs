// src/audit.rs
//
// Read-only consistency check of the denormalized counters. Nothing here
// repairs data; findings are reported for an operator to act on.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

use crate::model::{Employee, Hall};
use crate::store::{Collection, DocRef, Document, DocumentStore, Record, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Finding {
    /// Employee `workingDays` differs from the number of attended days.
    #[serde(rename_all = "camelCase")]
    EmployeeCounter {
        employee_id: String,
        stored: u32,
        attended: u32,
    },
    /// The dates a hall records for an employee differ from the days that
    /// employee attended with this hall as the override.
    #[serde(rename_all = "camelCase")]
    HallDates {
        hall_id: String,
        employee_id: String,
        recorded: Vec<String>,
        expected: Vec<String>,
    },
    /// Per-hall `daysWorked` differs from the number of recorded dates.
    #[serde(rename_all = "camelCase")]
    DaysWorked {
        hall_id: String,
        employee_id: String,
        days_worked: u32,
        recorded_dates: u32,
    },
    /// Hall `workingDays` differs from the sum of its employees' `daysWorked`.
    #[serde(rename_all = "camelCase")]
    HallTotal {
        hall_id: String,
        stored: u32,
        summed: u32,
    },
    /// An employee entry with zero days that should have been pruned.
    #[serde(rename_all = "camelCase")]
    ZeroEntry { hall_id: String, employee_id: String },
    /// A `dailyHalls` override naming a hall that does not exist.
    #[serde(rename_all = "camelCase")]
    DanglingHall {
        employee_id: String,
        date: String,
        hall_id: String,
    },
    /// A stored counter that is not a non-negative integer.
    #[serde(rename_all = "camelCase")]
    MalformedCounter { document: String, raw: String },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::EmployeeCounter {
                employee_id,
                stored,
                attended,
            } => write!(
                f,
                "employee {}: workingDays is {} but {} day(s) are marked attended",
                employee_id, stored, attended
            ),
            Finding::HallDates {
                hall_id,
                employee_id,
                recorded,
                expected,
            } => write!(
                f,
                "hall {}: dates for employee {} are [{}], expected [{}]",
                hall_id,
                employee_id,
                recorded.join(", "),
                expected.join(", ")
            ),
            Finding::DaysWorked {
                hall_id,
                employee_id,
                days_worked,
                recorded_dates,
            } => write!(
                f,
                "hall {}: employee {} has daysWorked {} but {} recorded date(s)",
                hall_id, employee_id, days_worked, recorded_dates
            ),
            Finding::HallTotal {
                hall_id,
                stored,
                summed,
            } => write!(
                f,
                "hall {}: workingDays is {} but employees sum to {}",
                hall_id, stored, summed
            ),
            Finding::ZeroEntry {
                hall_id,
                employee_id,
            } => write!(
                f,
                "hall {}: employee {} is listed with zero days",
                hall_id, employee_id
            ),
            Finding::DanglingHall {
                employee_id,
                date,
                hall_id,
            } => write!(
                f,
                "employee {}: {} is assigned to missing hall {}",
                employee_id, date, hall_id
            ),
            Finding::MalformedCounter { document, raw } => {
                write!(f, "{}: workingDays '{}' is not a valid count", document, raw)
            }
        }
    }
}

/// Days on which the employee attended with `hall_id` as the override.
fn expected_dates(employee: &Employee, hall_id: &str) -> BTreeSet<String> {
    employee
        .attendance
        .iter()
        .filter(|(day, worked)| **worked && employee.hall_override(day) == Some(hall_id))
        .map(|(day, _)| day.clone())
        .collect()
}

pub fn audit(employees: &[Employee], halls: &[Hall]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let hall_ids: BTreeSet<&str> = halls.iter().map(|h| h.id.as_str()).collect();

    for employee in employees {
        let attended = employee.attended_day_count() as u32;
        if employee.working_days != attended {
            findings.push(Finding::EmployeeCounter {
                employee_id: employee.id.clone(),
                stored: employee.working_days,
                attended,
            });
        }
        for (day, hall_id) in &employee.daily_halls {
            if !hall_id.is_empty() && !hall_ids.contains(hall_id.as_str()) {
                findings.push(Finding::DanglingHall {
                    employee_id: employee.id.clone(),
                    date: day.clone(),
                    hall_id: hall_id.clone(),
                });
            }
        }
    }

    let employees_by_id: BTreeMap<&str, &Employee> =
        employees.iter().map(|e| (e.id.as_str(), e)).collect();

    for hall in halls {
        let mut involved: BTreeSet<&str> = hall.employee_dates.keys().map(String::as_str).collect();
        involved.extend(hall.summaries().map(|e| e.id.as_str()));
        for employee in employees {
            if employee.daily_halls.values().any(|id| *id == hall.id) {
                involved.insert(employee.id.as_str());
            }
        }

        for employee_id in involved {
            let recorded: BTreeSet<String> = hall.dates_for(employee_id).iter().cloned().collect();
            let expected = employees_by_id
                .get(employee_id)
                .map(|e| expected_dates(e, &hall.id))
                .unwrap_or_default();
            if recorded != expected {
                findings.push(Finding::HallDates {
                    hall_id: hall.id.clone(),
                    employee_id: employee_id.to_string(),
                    recorded: recorded.into_iter().collect(),
                    expected: expected.into_iter().collect(),
                });
            }

            let days_worked = hall
                .employee_entry(employee_id)
                .map(|entry| entry.days_worked)
                .unwrap_or(0);
            let recorded_dates = hall.dates_for(employee_id).len() as u32;
            if days_worked != recorded_dates {
                findings.push(Finding::DaysWorked {
                    hall_id: hall.id.clone(),
                    employee_id: employee_id.to_string(),
                    days_worked,
                    recorded_dates,
                });
            }
            if hall.employee_entry(employee_id).is_some() && days_worked == 0 {
                findings.push(Finding::ZeroEntry {
                    hall_id: hall.id.clone(),
                    employee_id: employee_id.to_string(),
                });
            }
        }

        let summed: u32 = hall.summaries().map(|e| e.days_worked).sum();
        if hall.working_days != summed {
            findings.push(Finding::HallTotal {
                hall_id: hall.id.clone(),
                stored: hall.working_days,
                summed,
            });
        }
    }

    if findings.is_empty() {
        info!(
            "Audit clean: {} employee(s), {} hall(s)",
            employees.len(),
            halls.len()
        );
    } else {
        warn!("Audit found {} inconsistency(ies)", findings.len());
    }
    findings
}

/// Checks the raw `workingDays` text of stored documents. Typed records clamp
/// bad counters to zero, so this has to look at the documents themselves.
pub fn malformed_counters(collection: Collection, documents: &[Document]) -> Vec<Finding> {
    documents
        .iter()
        .filter_map(|document| {
            let text = match document.fields.get("workingDays")? {
                Value::Null => return None,
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            let trimmed = text.trim();
            let valid = !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit());
            (!valid).then(|| Finding::MalformedCounter {
                document: DocRef::new(collection, document.id.clone()).to_string(),
                raw: text,
            })
        })
        .collect()
}

/// Loads both collections once and runs every check against them.
pub async fn audit_store(store: &dyn DocumentStore) -> Result<Vec<Finding>, StoreError> {
    let employee_docs = store.list_all(Collection::Employees).await?;
    let hall_docs = store.list_all(Collection::Halls).await?;

    let mut findings = malformed_counters(Collection::Employees, &employee_docs);
    findings.extend(malformed_counters(Collection::Halls, &hall_docs));

    let employees = employee_docs
        .into_iter()
        .map(Employee::from_document)
        .collect::<Result<Vec<_>, _>>()?;
    let halls = hall_docs
        .into_iter()
        .map(Hall::from_document)
        .collect::<Result<Vec<_>, _>>()?;
    findings.extend(audit(&employees, &halls));
    Ok(findings)
}
