// src/payroll.rs
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::warn;

use crate::derivation::name_matches;
use crate::model::Employee;

/// Leading-decimal parse of a stored daily rate: "350", "350.5 NIS" and
/// " 12.75" are accepted, anything without a leading number reads as 0.
pub fn parse_daily_rate(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    let mut end = 0;
    let mut seen_dot = false;
    for (index, c) in trimmed.char_indices() {
        match c {
            '-' | '+' if index == 0 => {}
            '0'..='9' => {}
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = index + c.len_utf8();
    }
    let number = trimmed[..end].trim_end_matches('.');
    if number.is_empty() || number == "-" || number == "+" {
        return Decimal::ZERO;
    }
    Decimal::from_str(number).unwrap_or_else(|_| {
        warn!("Daily rate '{}' could not be parsed; using 0", raw);
        Decimal::ZERO
    })
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn unrounded_salary(daily_rate: Decimal, working_days: u32) -> Decimal {
    daily_rate * Decimal::from(working_days)
}

/// `dailyRate * workingDays` rounded to two places.
pub fn monthly_salary(daily_rate: Decimal, working_days: u32) -> Decimal {
    round_money(unrounded_salary(daily_rate, working_days))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollRow {
    pub employee_id: String,
    pub name: String,
    pub contact_number: Option<String>,
    pub daily_rate: Decimal,
    pub working_days: u32,
    pub car_days_count: usize,
    pub salary: Decimal,
    pub comment: String,
}

pub fn payroll_rows(employees: &[Employee], name_filter: Option<&str>) -> Vec<PayrollRow> {
    employees
        .iter()
        .filter(|employee| name_matches(&employee.name, name_filter))
        .map(|employee| {
            let daily_rate = parse_daily_rate(employee.daily_rate.as_deref().unwrap_or(""));
            PayrollRow {
                employee_id: employee.id.clone(),
                name: employee.name.clone(),
                contact_number: employee.contact_number.clone(),
                daily_rate,
                working_days: employee.working_days,
                car_days_count: employee.car_day_count(),
                salary: monthly_salary(daily_rate, employee.working_days),
                comment: employee.comment.clone().unwrap_or_default(),
            }
        })
        .collect()
}

/// Sum of the matching employees' unrounded salaries, rounded once at the end.
pub fn payroll_total(employees: &[Employee], name_filter: Option<&str>) -> Decimal {
    let total = employees
        .iter()
        .filter(|employee| name_matches(&employee.name, name_filter))
        .fold(dec!(0), |sum, employee| {
            sum + unrounded_salary(
                parse_daily_rate(employee.daily_rate.as_deref().unwrap_or("")),
                employee.working_days,
            )
        });
    round_money(total)
}
