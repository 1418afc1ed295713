// src/derivation.rs
//
// Read-only views computed from loaded employees and halls. Nothing in this
// module writes to the store or changes a stored aggregate.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::model::{day_key, Employee, Hall};

pub const UNKNOWN_HALL_LABEL: &str = "unknown venue";
pub const NO_HALL_LABEL: &str = "-";

/// Where an employee worked on a given day, as far as the records tell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ResolvedHall {
    Hall { id: String, name: String },
    /// The employee references a hall id that no longer exists.
    Unknown { id: String },
    Unassigned,
}

impl ResolvedHall {
    pub fn resolve(hall_id: Option<&str>, halls: &[Hall]) -> Self {
        match hall_id {
            None => ResolvedHall::Unassigned,
            Some(id) => match halls.iter().find(|hall| hall.id == id) {
                Some(hall) => ResolvedHall::Hall {
                    id: hall.id.clone(),
                    name: hall.name.clone(),
                },
                None => ResolvedHall::Unknown { id: id.to_string() },
            },
        }
    }
}

impl fmt::Display for ResolvedHall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedHall::Hall { name, .. } => f.write_str(name),
            ResolvedHall::Unknown { .. } => f.write_str(UNKNOWN_HALL_LABEL),
            ResolvedHall::Unassigned => f.write_str(NO_HALL_LABEL),
        }
    }
}

// --- Employee range report ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkedDay {
    pub date: NaiveDate,
    pub day_of_week: String,
    pub hall: ResolvedHall,
    pub had_car: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeReport {
    pub employee_id: String,
    pub employee_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<WorkedDay>,
    pub working_days: usize,
    pub car_days: usize,
}

/// Attended days in `[start, end]`, ascending, each with the hall it resolves
/// to (override, then default hall) and the car flag. An inverted range is
/// empty.
pub fn working_days_in_range(
    employee: &Employee,
    halls: &[Hall],
    start: NaiveDate,
    end: NaiveDate,
) -> RangeReport {
    let days: Vec<WorkedDay> = start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter_map(|date| {
            let key = day_key(date);
            if !employee.is_attending(&key) {
                return None;
            }
            Some(WorkedDay {
                date,
                day_of_week: date.format("%A").to_string(),
                hall: ResolvedHall::resolve(employee.resolved_hall(&key), halls),
                had_car: employee.has_car(&key),
            })
        })
        .collect();

    let car_days = days.iter().filter(|day| day.had_car).count();
    debug!(
        "Range {}..{} for {}: {} working day(s), {} with car",
        start,
        end,
        employee.id,
        days.len(),
        car_days
    );
    RangeReport {
        employee_id: employee.id.clone(),
        employee_name: employee.name.clone(),
        start,
        end,
        working_days: days.len(),
        car_days,
        days,
    }
}

// --- Hall work dates ---

/// Every date recorded against the hall, deduplicated and ascending. Halls
/// saved before `employeeDates` existed fall back to
/// [`reconstruct_hall_dates_from_attendance`].
pub fn hall_work_dates(hall: &Hall, employees: &[Employee]) -> Vec<String> {
    let recorded: BTreeSet<&String> = hall.employee_dates.values().flatten().collect();
    if recorded.is_empty() {
        return reconstruct_hall_dates_from_attendance(hall, employees);
    }
    recorded.into_iter().cloned().collect()
}

/// Compatibility path for halls without `employeeDates`: scans every
/// employee's attended days whose override names this hall.
pub fn reconstruct_hall_dates_from_attendance(hall: &Hall, employees: &[Employee]) -> Vec<String> {
    let dates: BTreeSet<String> = employees
        .iter()
        .flat_map(|employee| {
            employee
                .attendance
                .iter()
                .filter(move |(day, worked)| {
                    **worked && employee.hall_override(day) == Some(hall.id.as_str())
                })
                .map(|(day, _)| day.clone())
        })
        .collect();
    if !dates.is_empty() {
        debug!(
            "Reconstructed {} work date(s) for hall {} from attendance",
            dates.len(),
            hall.id
        );
    }
    dates.into_iter().collect()
}

// --- Daily presence board ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    pub employee_id: String,
    pub name: String,
    pub contact_number: Option<String>,
    pub email: Option<String>,
    pub assigned_hall: Option<String>,
    pub working_today: bool,
    /// The day's override only; the default hall is not substituted here.
    pub today_hall: ResolvedHall,
    pub has_car_today: bool,
    pub car_days_count: usize,
    pub working_days: u32,
}

/// Case-insensitive substring match; a blank filter matches everything.
pub fn name_matches(name: &str, filter: Option<&str>) -> bool {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(needle) => name.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardFilter {
    /// Keeps employees whose default hall equals this id.
    pub hall_id: Option<String>,
    /// Case-insensitive substring of the employee name.
    pub name: Option<String>,
}

pub fn daily_board(
    employees: &[Employee],
    halls: &[Hall],
    date: NaiveDate,
    filter: &BoardFilter,
) -> Vec<BoardRow> {
    let key = day_key(date);
    let hall_filter = filter.hall_id.as_deref().filter(|id| !id.is_empty());

    employees
        .iter()
        .filter(|employee| match hall_filter {
            Some(hall_id) => employee.assigned_hall.as_deref() == Some(hall_id),
            None => true,
        })
        .filter(|employee| name_matches(&employee.name, filter.name.as_deref()))
        .map(|employee| BoardRow {
            employee_id: employee.id.clone(),
            name: employee.name.clone(),
            contact_number: employee.contact_number.clone(),
            email: employee.email.clone(),
            assigned_hall: employee.assigned_hall.clone(),
            working_today: employee.is_attending(&key),
            today_hall: ResolvedHall::resolve(employee.hall_override(&key), halls),
            has_car_today: employee.has_car(&key),
            car_days_count: employee.car_day_count(),
            working_days: employee.working_days,
        })
        .collect()
}

// --- Hall summaries ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallSummaryEmployee {
    pub id: String,
    pub name: String,
    pub days_worked: u32,
    pub contact_number: String,
    pub is_default_hall: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallSummary {
    pub id: String,
    pub name: String,
    pub location: String,
    pub total_days_worked: u32,
    pub employee_count: usize,
    pub work_dates: Vec<String>,
    /// Most days first.
    pub employees: Vec<HallSummaryEmployee>,
}

pub fn hall_summaries(halls: &[Hall], employees: &[Employee]) -> Vec<HallSummary> {
    halls
        .iter()
        .map(|hall| {
            let mut rows: Vec<HallSummaryEmployee> = hall
                .summaries()
                .map(|entry| {
                    let employee = employees.iter().find(|e| e.id == entry.id);
                    HallSummaryEmployee {
                        id: entry.id.clone(),
                        name: entry.name.clone(),
                        days_worked: entry.days_worked,
                        contact_number: employee
                            .and_then(|e| e.contact_number.clone())
                            .unwrap_or_default(),
                        is_default_hall: employee
                            .map(|e| e.assigned_hall.as_deref() == Some(hall.id.as_str()))
                            .unwrap_or(false),
                    }
                })
                .collect();
            rows.sort_by(|a, b| b.days_worked.cmp(&a.days_worked));

            HallSummary {
                id: hall.id.clone(),
                name: hall.name.clone(),
                location: hall.location.clone(),
                total_days_worked: hall.working_days,
                employee_count: rows.len(),
                work_dates: hall_work_dates(hall, employees),
                employees: rows,
            }
        })
        .collect()
}

/// Sum of the stored hall counters.
pub fn total_working_days(halls: &[Hall]) -> u64 {
    halls.iter().map(|hall| u64::from(hall.working_days)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HallEmployee, HallEmployeeEntry};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn halls() -> Vec<Hall> {
        vec![
            Hall {
                id: "h1".into(),
                name: "North".into(),
                ..Default::default()
            },
            Hall {
                id: "h2".into(),
                name: "South".into(),
                ..Default::default()
            },
        ]
    }

    fn worker() -> Employee {
        let mut employee = Employee {
            id: "e1".into(),
            name: "Dana Levi".into(),
            contact_number: Some("0501234567".into()),
            assigned_hall: Some("h1".into()),
            working_days: 4,
            ..Default::default()
        };
        for (day, worked) in [
            ("2024-04-30", true),
            ("2024-05-01", true),
            ("2024-05-02", false),
            ("2024-05-03", true),
            ("2024-05-05", true),
        ] {
            employee.attendance.insert(day.into(), worked);
        }
        employee.daily_halls.insert("2024-05-03".into(), "h2".into());
        employee.daily_halls.insert("2024-05-05".into(), "gone".into());
        employee.car_availability.insert("2024-05-03".into(), true);
        employee.car_availability.insert("2024-05-04".into(), true);
        employee
    }

    #[test]
    fn range_lists_attended_days_with_resolved_halls() {
        let report = working_days_in_range(&worker(), &halls(), date(1), date(5));

        let dates: Vec<_> = report.days.iter().map(|d| d.date).collect();
        assert_eq!(dates, [date(1), date(3), date(5)]);
        assert_eq!(report.days[0].hall.to_string(), "North");
        assert_eq!(report.days[0].day_of_week, "Wednesday");
        assert!(matches!(&report.days[1].hall, ResolvedHall::Hall { id, .. } if id == "h2"));
        assert!(report.days[1].had_car);
        assert_eq!(report.days[2].hall.to_string(), UNKNOWN_HALL_LABEL);
        assert_eq!(report.working_days, 3);
        assert_eq!(report.car_days, 1);
    }

    #[test]
    fn range_is_inclusive_and_inverted_range_is_empty() {
        let report = working_days_in_range(&worker(), &halls(), date(3), date(3));
        assert_eq!(report.days.len(), 1);

        let report = working_days_in_range(&worker(), &halls(), date(5), date(1));
        assert!(report.days.is_empty());
    }

    #[test]
    fn range_without_default_hall_is_unassigned() {
        let mut employee = worker();
        employee.assigned_hall = None;
        let report = working_days_in_range(&employee, &halls(), date(1), date(1));
        assert_eq!(report.days[0].hall, ResolvedHall::Unassigned);
        assert_eq!(report.days[0].hall.to_string(), "-");
    }

    #[test]
    fn hall_dates_come_from_employee_dates_when_present() {
        let mut hall = halls().remove(1);
        hall.employee_dates
            .insert("e1".into(), vec!["2024-05-09".into(), "2024-05-03".into()]);
        hall.employee_dates
            .insert("e2".into(), vec!["2024-05-03".into()]);
        assert_eq!(
            hall_work_dates(&hall, &[worker()]),
            ["2024-05-03", "2024-05-09"]
        );
    }

    #[test]
    fn hall_dates_fall_back_to_attendance_scan() {
        let hall = halls().remove(1);
        assert_eq!(hall_work_dates(&hall, &[worker()]), ["2024-05-03"]);
        // the default hall is not an override, so h1 reconstructs nothing
        assert!(reconstruct_hall_dates_from_attendance(&halls()[0], &[worker()]).is_empty());
    }

    #[test]
    fn board_filters_and_flags() {
        let mut other = worker();
        other.id = "e2".into();
        other.name = "Joe".into();
        other.assigned_hall = Some("h2".into());
        let employees = vec![worker(), other];

        let rows = daily_board(&employees, &halls(), date(3), &BoardFilter::default());
        assert_eq!(rows.len(), 2);
        assert!(rows[0].working_today);
        assert!(rows[0].has_car_today);
        assert_eq!(rows[0].today_hall.to_string(), "South");
        assert_eq!(rows[0].car_days_count, 2);

        let filter = BoardFilter {
            hall_id: Some("h1".into()),
            name: Some("  LEVI ".into()),
        };
        let rows = daily_board(&employees, &halls(), date(2), &filter);
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].working_today);
        assert_eq!(rows[0].today_hall, ResolvedHall::Unassigned);
    }

    #[test]
    fn summaries_sort_employees_by_days() {
        let mut hall = halls().remove(0);
        hall.working_days = 5;
        hall.employees = vec![
            HallEmployee {
                id: "e9".into(),
                name: "Guest".into(),
                days_worked: 1,
            }
            .into(),
            HallEmployeeEntry::Legacy(serde_json::json!("Old name")),
            HallEmployee {
                id: "e1".into(),
                name: "Dana Levi".into(),
                days_worked: 4,
            }
            .into(),
        ];
        let summaries = hall_summaries(&[hall], &[worker()]);
        let summary = &summaries[0];
        assert_eq!(summary.total_days_worked, 5);
        assert_eq!(summary.employee_count, 2);
        assert_eq!(summary.employees[0].id, "e1");
        assert!(summary.employees[0].is_default_hall);
        assert_eq!(summary.employees[0].contact_number, "0501234567");
        assert_eq!(summary.employees[1].contact_number, "");
        assert!(!summary.employees[1].is_default_hall);
        assert_eq!(total_working_days(&summaries_halls()), 7);
    }

    fn summaries_halls() -> Vec<Hall> {
        let mut list = halls();
        list[0].working_days = 3;
        list[1].working_days = 4;
        list
    }
}
