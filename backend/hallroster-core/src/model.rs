// src/model.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub type EmployeeId = String;
pub type HallId = String;

/// Day keys are stored as ISO calendar dates ("YYYY-MM-DD").
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

pub fn parse_day_key(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DAY_KEY_FORMAT).ok()
}

// --- Employee ---

/// A worker with per-day attendance, hall overrides and car flags.
///
/// `working_days` is a denormalized counter kept equal to the number of
/// `true` entries in `attendance`. It is stored as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(default)]
    pub id: EmployeeId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_hall: Option<HallId>,
    #[serde(default, with = "text_counter")]
    pub working_days: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attendance: BTreeMap<String, bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily_halls: BTreeMap<String, HallId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub car_availability: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Employee {
    pub fn is_attending(&self, day: &str) -> bool {
        self.attendance.get(day).copied().unwrap_or(false)
    }

    pub fn has_car(&self, day: &str) -> bool {
        self.car_availability.get(day).copied().unwrap_or(false)
    }

    /// The per-day hall override. Empty strings count as "no override".
    pub fn hall_override(&self, day: &str) -> Option<&str> {
        self.daily_halls
            .get(day)
            .map(String::as_str)
            .filter(|hall_id| !hall_id.is_empty())
    }

    pub fn default_hall(&self) -> Option<&str> {
        self.assigned_hall
            .as_deref()
            .filter(|hall_id| !hall_id.is_empty())
    }

    /// Override first, then the default hall.
    pub fn resolved_hall(&self, day: &str) -> Option<&str> {
        self.hall_override(day).or_else(|| self.default_hall())
    }

    pub fn attended_day_count(&self) -> usize {
        self.attendance.values().filter(|worked| **worked).count()
    }

    pub fn car_day_count(&self) -> usize {
        self.car_availability.values().filter(|had| **had).count()
    }
}

// --- Hall ---

/// Per-hall summary of one employee: how many assignment-days they have here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HallEmployee {
    pub id: EmployeeId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub days_worked: u32,
}

/// One element of a hall's `employees` array. Halls saved by older clients
/// hold plain name strings there; those are kept as they are and carried
/// through every write, but take no part in the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HallEmployeeEntry {
    Summary(HallEmployee),
    Legacy(serde_json::Value),
}

impl HallEmployeeEntry {
    pub fn summary(&self) -> Option<&HallEmployee> {
        match self {
            HallEmployeeEntry::Summary(entry) => Some(entry),
            HallEmployeeEntry::Legacy(_) => None,
        }
    }

    fn is_for(&self, employee_id: &str) -> bool {
        self.summary().is_some_and(|entry| entry.id == employee_id)
    }
}

impl From<HallEmployee> for HallEmployeeEntry {
    fn from(entry: HallEmployee) -> Self {
        HallEmployeeEntry::Summary(entry)
    }
}

/// A venue. Its aggregates (`working_days`, `employees`, `employee_dates`)
/// are only ever changed by the reconciliation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hall {
    #[serde(default)]
    pub id: HallId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, with = "text_counter")]
    pub working_days: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employees: Vec<HallEmployeeEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employee_dates: BTreeMap<EmployeeId, Vec<String>>,
}

impl Hall {
    /// The `{id, name, daysWorked}` entries, skipping legacy ones.
    pub fn summaries(&self) -> impl Iterator<Item = &HallEmployee> {
        self.employees.iter().filter_map(HallEmployeeEntry::summary)
    }

    pub fn employee_entry(&self, employee_id: &str) -> Option<&HallEmployee> {
        self.summaries().find(|entry| entry.id == employee_id)
    }

    pub fn dates_for(&self, employee_id: &str) -> &[String] {
        self.employee_dates
            .get(employee_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Takes one assignment-day for `employee_id` on `day` off this hall.
    /// Every counter is clamped at zero; an employee whose `days_worked`
    /// reaches zero is pruned from `employees`.
    pub fn remove_assignment_day(&mut self, employee_id: &str, day: &str) {
        if let Some(index) = self.employees.iter().position(|e| e.is_for(employee_id)) {
            if let HallEmployeeEntry::Summary(entry) = &mut self.employees[index] {
                entry.days_worked = entry.days_worked.saturating_sub(1);
                if entry.days_worked == 0 {
                    self.employees.remove(index);
                }
            }
        }

        if let Some(dates) = self.employee_dates.get_mut(employee_id) {
            dates.retain(|recorded| recorded != day);
            if dates.is_empty() {
                self.employee_dates.remove(employee_id);
            }
        }

        self.working_days = self.working_days.saturating_sub(1);
    }

    /// Records one assignment-day for `employee_id` on `day`. The date list
    /// has set semantics; the counters always move by exactly one.
    pub fn add_assignment_day(&mut self, employee_id: &str, employee_name: &str, day: &str) {
        let existing = self.employees.iter_mut().find_map(|e| match e {
            HallEmployeeEntry::Summary(entry) if entry.id == employee_id => Some(entry),
            _ => None,
        });
        match existing {
            Some(entry) => entry.days_worked += 1,
            None => self.employees.push(HallEmployeeEntry::Summary(HallEmployee {
                id: employee_id.to_string(),
                name: employee_name.to_string(),
                days_worked: 1,
            })),
        }

        let dates = self
            .employee_dates
            .entry(employee_id.to_string())
            .or_default();
        if !dates.iter().any(|recorded| recorded == day) {
            dates.push(day.to_string());
        }

        self.working_days += 1;
    }

    pub fn reset_aggregates(&mut self) {
        self.working_days = 0;
        self.employees.clear();
        self.employee_dates.clear();
    }
}

// --- User accounts (session gate) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    // Stored as entered; credential handling is not redesigned here.
    #[serde(default, deserialize_with = "null_as_default")]
    pub password: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_role() -> String {
    "user".to_string()
}

fn default_active() -> bool {
    true
}

// --- Serde helpers ---

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Counters are persisted as decimal text ("12"). Reading accepts text or a
/// number; anything unparsable reads as 0 and negative values clamp to 0.
pub mod text_counter {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u32, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(text)) => parse_counter(&text),
            Some(serde_json::Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f.trunc() as i64))
                .map(clamp_counter)
                .unwrap_or(0),
            _ => 0,
        })
    }

    /// Leading-integer parse: "7", " 7 ", "7.5" and "7 days" all read as 7.
    pub fn parse_counter(text: &str) -> u32 {
        let trimmed = text.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let leading: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
        match leading.parse::<i64>() {
            Ok(value) if negative => clamp_counter(-value),
            Ok(value) => clamp_counter(value),
            Err(_) => 0,
        }
    }

    fn clamp_counter(value: i64) -> u32 {
        value.clamp(0, u32::MAX as i64) as u32
    }
}
