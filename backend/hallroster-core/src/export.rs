// src/export.rs
use chrono::{Datelike, NaiveDate};
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::derivation::{
    daily_board, hall_summaries, working_days_in_range, BoardFilter, BoardRow, HallSummary,
    RangeReport,
};
use crate::model::parse_day_key;
use crate::payroll::{payroll_rows, payroll_total, PayrollRow};
use crate::roster::RosterSnapshot;

const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";
const DATES_PER_ROW: usize = 5;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV writing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer could not be finalized: {0}")]
    Buffer(String),

    #[error("unknown export kind '{0}' (expected range, board, payroll or halls)")]
    UnknownKind(String),

    #[error("the {0} export needs the '{1}' parameter")]
    MissingParameter(ExportKind, &'static str),

    #[error("employee {0} not found")]
    UnknownEmployee(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Range,
    Board,
    Payroll,
    Halls,
}

impl FromStr for ExportKind {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "range" => Ok(ExportKind::Range),
            "board" => Ok(ExportKind::Board),
            "payroll" => Ok(ExportKind::Payroll),
            "halls" => Ok(ExportKind::Halls),
            other => Err(ExportError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportKind::Range => "range",
            ExportKind::Board => "board",
            ExportKind::Payroll => "payroll",
            ExportKind::Halls => "halls",
        })
    }
}

pub fn display_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

/// Stored day keys that fail to parse are written as they are.
fn display_day_key(day: &str) -> String {
    parse_day_key(day)
        .map(display_date)
        .unwrap_or_else(|| day.to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.error().to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Buffer(e.to_string()))
}

pub fn range_report_csv(report: &RangeReport) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(["Date", "Day", "Hall", "Had car"])?;
    for day in &report.days {
        writer.write_record([
            display_date(day.date),
            day.day_of_week.clone(),
            day.hall.to_string(),
            yes_no(day.had_car).to_string(),
        ])?;
    }
    debug!(
        "Exported {} day(s) for employee {}",
        report.days.len(),
        report.employee_id
    );
    finish(writer)
}

pub fn board_csv(rows: &[BoardRow]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record([
        "Name",
        "Phone",
        "Email",
        "Hall today",
        "Working days",
        "Working today",
        "Has car",
        "Car days",
    ])?;
    for row in rows {
        writer.write_record([
            row.name.clone(),
            or_dash(row.contact_number.as_deref()).to_string(),
            or_dash(row.email.as_deref()).to_string(),
            row.today_hall.to_string(),
            row.working_days.to_string(),
            yes_no(row.working_today).to_string(),
            yes_no(row.has_car_today).to_string(),
            row.car_days_count.to_string(),
        ])?;
    }
    finish(writer)
}

pub fn payroll_csv(rows: &[PayrollRow], total: Decimal) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record([
        "Name",
        "Phone",
        "Daily rate",
        "Working days",
        "Car days",
        "Salary",
        "Comment",
    ])?;
    for row in rows {
        writer.write_record([
            row.name.clone(),
            or_dash(row.contact_number.as_deref()).to_string(),
            row.daily_rate.to_string(),
            row.working_days.to_string(),
            row.car_days_count.to_string(),
            format!("{:.2}", row.salary),
            row.comment.clone(),
        ])?;
    }
    let total = format!("{:.2}", total);
    writer.write_record(["Total", "", "", "", "", total.as_str(), ""])?;
    finish(writer)
}

/// Summary table of all halls followed by one block per hall with its
/// employees and work dates.
pub fn hall_summaries_csv(summaries: &[HallSummary]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
    writer.write_record(["Hall", "Location", "Working days", "Employees"])?;
    for hall in summaries {
        writer.write_record([
            hall.name.clone(),
            hall.location.clone(),
            hall.total_days_worked.to_string(),
            hall.employee_count.to_string(),
        ])?;
    }

    for hall in summaries {
        writer.write_record([""])?;
        writer.write_record([format!("Hall: {}", hall.name)])?;
        writer.write_record(["Name", "Phone", "Default hall", "Days at hall"])?;
        for employee in &hall.employees {
            writer.write_record([
                employee.name.clone(),
                employee.contact_number.clone(),
                yes_no(employee.is_default_hall).to_string(),
                employee.days_worked.to_string(),
            ])?;
        }
        if !hall.work_dates.is_empty() {
            writer.write_record(["Work dates"])?;
            for chunk in hall.work_dates.chunks(DATES_PER_ROW) {
                writer.write_record(chunk.iter().map(|day| display_day_key(day)))?;
            }
        }
    }
    finish(writer)
}

/// Optional inputs of an export. Unset dates default relative to `today`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportParams {
    pub employee: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub date: Option<NaiveDate>,
    pub hall: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedExport {
    pub file_name: String,
    pub body: String,
}

pub fn render(
    kind: ExportKind,
    params: &ExportParams,
    roster: &RosterSnapshot,
    today: NaiveDate,
) -> Result<RenderedExport, ExportError> {
    let (file_name, body) = match kind {
        ExportKind::Range => {
            let employee_id = params
                .employee
                .as_deref()
                .ok_or(ExportError::MissingParameter(kind, "employee"))?;
            let employee = roster
                .employee(employee_id)
                .ok_or_else(|| ExportError::UnknownEmployee(employee_id.to_string()))?;
            // current month so far
            let start = params.start.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
            let end = params.end.unwrap_or(today);
            let report = working_days_in_range(employee, &roster.halls, start, end);
            (
                format!("{}_working_days.csv", employee.name.replace(char::is_whitespace, "_")),
                range_report_csv(&report)?,
            )
        }
        ExportKind::Board => {
            let date = params.date.unwrap_or(today);
            let filter = BoardFilter {
                hall_id: params.hall.clone(),
                name: params.name.clone(),
            };
            let rows = daily_board(&roster.employees, &roster.halls, date, &filter);
            (format!("employees_{}.csv", date), board_csv(&rows)?)
        }
        ExportKind::Payroll => {
            let name = params.name.as_deref();
            let rows = payroll_rows(&roster.employees, name);
            let total = payroll_total(&roster.employees, name);
            (
                format!("payroll_{}_{:02}.csv", today.year(), today.month()),
                payroll_csv(&rows, total)?,
            )
        }
        ExportKind::Halls => {
            let summaries = hall_summaries(&roster.halls, &roster.employees);
            (
                format!("halls_{}_{:02}.csv", today.year(), today.month()),
                hall_summaries_csv(&summaries)?,
            )
        }
    };
    debug!("Rendered {} export as {}", kind, file_name);
    Ok(RenderedExport { file_name, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{HallSummaryEmployee, ResolvedHall, WorkedDay};
    use rust_decimal_macros::dec;

    #[test]
    fn export_kinds_parse() {
        assert_eq!("Payroll".parse::<ExportKind>().unwrap(), ExportKind::Payroll);
        assert!(matches!(
            "xlsx".parse::<ExportKind>(),
            Err(ExportError::UnknownKind(_))
        ));
    }

    #[test]
    fn range_rows_use_display_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let report = RangeReport {
            employee_id: "e1".into(),
            employee_name: "Dana".into(),
            start: date,
            end: date,
            days: vec![WorkedDay {
                date,
                day_of_week: "Wednesday".into(),
                hall: ResolvedHall::Hall {
                    id: "h1".into(),
                    name: "North, East".into(),
                },
                had_car: true,
            }],
            working_days: 1,
            car_days: 1,
        };
        let csv = range_report_csv(&report).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines,
            [
                "Date,Day,Hall,Had car",
                "01/05/2024,Wednesday,\"North, East\",Yes"
            ]
        );
    }

    #[test]
    fn payroll_ends_with_total_row() {
        let rows = vec![PayrollRow {
            employee_id: "e1".into(),
            name: "Dana".into(),
            contact_number: None,
            daily_rate: dec!(100.5),
            working_days: 2,
            car_days_count: 0,
            salary: dec!(201),
            comment: String::new(),
        }];
        let csv = payroll_csv(&rows, dec!(201)).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[1], "Dana,-,100.5,2,0,201.00,");
        assert_eq!(lines[2], "Total,,,,,201.00,");
    }

    #[test]
    fn hall_blocks_wrap_dates_in_rows_of_five() {
        let summary = HallSummary {
            id: "h1".into(),
            name: "North".into(),
            location: "Haifa".into(),
            total_days_worked: 6,
            employee_count: 1,
            work_dates: (1..=6).map(|d| format!("2024-05-0{}", d)).collect(),
            employees: vec![HallSummaryEmployee {
                id: "e1".into(),
                name: "Dana".into(),
                days_worked: 6,
                contact_number: String::new(),
                is_default_hall: true,
            }],
        };
        let csv = hall_summaries_csv(&[summary]).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[1], "North,Haifa,6,1");
        assert!(lines.contains(&"Dana,,Yes,6"));
        assert!(lines.contains(&"01/05/2024,02/05/2024,03/05/2024,04/05/2024,05/05/2024"));
        assert_eq!(lines.last(), Some(&"06/05/2024"));
    }

    #[test]
    fn range_export_needs_a_known_employee() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        let roster = RosterSnapshot::default();
        assert!(matches!(
            render(ExportKind::Range, &ExportParams::default(), &roster, today),
            Err(ExportError::MissingParameter(ExportKind::Range, "employee"))
        ));
        let params = ExportParams {
            employee: Some("e1".into()),
            ..Default::default()
        };
        assert!(matches!(
            render(ExportKind::Range, &params, &roster, today),
            Err(ExportError::UnknownEmployee(_))
        ));
    }

    #[test]
    fn range_export_defaults_to_the_current_month() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        let mut employee = crate::model::Employee {
            id: "e1".into(),
            name: "Dana Levi".into(),
            ..Default::default()
        };
        employee.attendance.insert("2024-04-30".into(), true);
        employee.attendance.insert("2024-05-02".into(), true);
        employee.attendance.insert("2024-05-21".into(), true);
        let roster = RosterSnapshot {
            employees: vec![employee],
            halls: Vec::new(),
        };
        let params = ExportParams {
            employee: Some("e1".into()),
            ..Default::default()
        };
        let export = render(ExportKind::Range, &params, &roster, today).unwrap();
        assert_eq!(export.file_name, "Dana_Levi_working_days.csv");
        assert_eq!(export.body.lines().count(), 2);
        assert!(export.body.contains("02/05/2024,Thursday,-,No"));
    }
}
