use chrono::{LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

use super::tournament_state::ScheduledSlot;
use crate::error::{BotError, Result};

const MAX_NAME_LEN: usize = 100;

/// Raw scheduling form input
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub name: String,
    /// `MM-DD-YY` or `MM-DD-YYYY`
    pub date: String,
    /// `HH:MM`, 12-hour clock
    pub time: String,
    /// `AM` or `PM`
    pub meridiem: String,
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| BotError::validation(format!("Unknown time zone '{}'.", name.trim())))
}

/// Turn the form input into an absolute start time in the guild's zone
pub fn resolve_slot(request: &ScheduleRequest, tz_name: &str) -> Result<ScheduledSlot> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(BotError::validation("Tournament name cannot be empty."));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(BotError::validation(format!(
            "Tournament name is too long (max {} characters).",
            MAX_NAME_LEN
        )));
    }

    let tz = parse_timezone(tz_name)?;
    let local = NaiveDateTime::new(
        parse_date(&request.date)?,
        parse_time(&request.time, &request.meridiem)?,
    );

    let start = match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            return Err(BotError::validation(format!(
                "{} does not exist in {} (daylight saving change).",
                local.format("%m-%d-%y %I:%M %p"),
                tz.name()
            )))
        }
    };

    let timestamp = start.timestamp();
    Ok(ScheduledSlot {
        name: name.to_string(),
        date: start.date_naive().format("%Y-%m-%d").to_string(),
        time: format!(
            "{} (<t:{}:f>)",
            start.format("%m-%d-%y %I:%M %p %Z"),
            timestamp
        ),
        timestamp,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let invalid = || BotError::validation(format!("Invalid date '{}'. Use MM-DD-YY.", raw.trim()));

    let parts: Vec<&str> = raw.trim().split('-').collect();
    let [month, day, year] = parts.as_slice() else {
        return Err(invalid());
    };
    let month: u32 = month.trim().parse().map_err(|_| invalid())?;
    let day: u32 = day.trim().parse().map_err(|_| invalid())?;
    let year: i32 = year.trim().parse().map_err(|_| invalid())?;
    let year = if year < 100 { 2000 + year } else { year };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn parse_time(raw: &str, meridiem: &str) -> Result<NaiveTime> {
    let invalid = || BotError::validation(format!("Invalid time '{}'. Use HH:MM.", raw.trim()));

    let (hour, minute) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = minute.trim().parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&hour) {
        return Err(invalid());
    }

    let hour = match meridiem.trim().to_uppercase().as_str() {
        "AM" => hour % 12,
        "PM" => hour % 12 + 12,
        _ => return Err(BotError::validation("Enter AM or PM.")),
    };

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}
