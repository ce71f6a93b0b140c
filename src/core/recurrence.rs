//! Next-occurrence calculation for recurring templates.
//!
//! Pure calendar arithmetic in UTC; the time of day of the current due date
//! is carried over to the next one.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};

use crate::error::{Result, TaskError};
use crate::types::{RecurrenceKind, RecurrenceRule};

/// Compute the due date that follows `current` under `rule`.
///
/// Returns `None` when either input is missing, when the candidate falls
/// after the rule's end instant, or when it lies past the last representable
/// date. In each case the series ends quietly.
pub fn next_occurrence(
    rule: Option<&RecurrenceRule>,
    current: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let (rule, current) = (rule?, current?);
    let interval = rule.interval.max(1);

    let candidate = match rule.kind {
        RecurrenceKind::Daily | RecurrenceKind::Custom => {
            current.checked_add_days(Days::new(u64::from(interval)))?
        }
        RecurrenceKind::Weekly if rule.days_of_week.is_empty() => {
            current.checked_add_days(Days::new(7 * u64::from(interval)))?
        }
        RecurrenceKind::Weekly => {
            let today = current.weekday().num_days_from_sunday();
            let days = rule.days_of_week.iter().map(|d| d.index());
            let offset = match days.clone().find(|&d| d > today) {
                Some(day) => day - today,
                None => {
                    // days_of_week is non-empty on this arm
                    let first = days.min().unwrap_or(today);
                    7 - today + first
                }
            };
            current.checked_add_days(Days::new(u64::from(offset)))?
        }
        RecurrenceKind::Monthly => {
            let day = rule.day_of_month.unwrap_or_else(|| current.day());
            add_months_rolling(current, interval, day)?
        }
    };

    match rule.end {
        Some(end) if candidate > end => None,
        _ => Some(candidate),
    }
}

/// Move `current` forward `months` calendar months and place it on `day`.
/// The day is counted from the 1st of the target month, so a day the
/// target month lacks spills into the month after it (April 31 -> May 1).
fn add_months_rolling(current: DateTime<Utc>, months: u32, day: u32) -> Option<DateTime<Utc>> {
    let first_of_month = NaiveDate::from_ymd_opt(current.year(), current.month(), 1)?
        .checked_add_months(Months::new(months))?;
    let date = first_of_month.checked_add_days(Days::new(u64::from(day.max(1)) - 1))?;
    Some(date.and_time(current.time()).and_utc())
}

/// Reject rules that could never be stored meaningfully.
pub fn validate_rule(rule: &RecurrenceRule) -> Result<()> {
    if rule.interval == 0 {
        return Err(TaskError::InvalidRecurrence(
            "interval must be at least 1".to_string(),
        ));
    }
    if let Some(day) = rule.day_of_month {
        if !(1..=31).contains(&day) {
            return Err(TaskError::InvalidRecurrence(format!(
                "day of month {day} is outside 1-31"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Weekday};

    use super::*;
    use crate::types::DayOfWeek;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    #[test]
    fn missing_inputs_yield_none() {
        let rule = RecurrenceRule::new(RecurrenceKind::Daily);
        assert_eq!(next_occurrence(Some(&rule), None), None);
        assert_eq!(next_occurrence(None, Some(at(2026, 1, 1))), None);
    }

    #[test]
    fn daily_adds_interval_days() {
        for interval in 1..=10 {
            let rule = RecurrenceRule::new(RecurrenceKind::Daily).every(interval);
            let next = next_occurrence(Some(&rule), Some(at(2026, 2, 25))).unwrap();
            assert_eq!(next, at(2026, 2, 25) + Duration::days(i64::from(interval)));
        }
    }

    #[test]
    fn daily_ends_after_end_date() {
        let rule = RecurrenceRule::new(RecurrenceKind::Daily)
            .every(2)
            .until(at(2026, 1, 3));
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 1, 1))),
            Some(at(2026, 1, 3))
        );
        assert_eq!(next_occurrence(Some(&rule), Some(at(2026, 1, 2))), None);
    }

    #[test]
    fn custom_behaves_like_daily() {
        let custom = RecurrenceRule::new(RecurrenceKind::Custom).every(3);
        let daily = RecurrenceRule::new(RecurrenceKind::Daily).every(3);
        let now = at(2026, 5, 30);
        assert_eq!(
            next_occurrence(Some(&custom), Some(now)),
            next_occurrence(Some(&daily), Some(now))
        );
    }

    #[test]
    fn zero_interval_counts_as_one() {
        let rule = RecurrenceRule::new(RecurrenceKind::Daily).every(0);
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 1, 1))),
            Some(at(2026, 1, 2))
        );
    }

    #[test]
    fn weekly_without_days_adds_weeks() {
        let rule = RecurrenceRule::new(RecurrenceKind::Weekly).every(2);
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 1, 1))),
            Some(at(2026, 1, 15))
        );
    }

    #[test]
    fn weekly_picks_next_listed_day_in_same_week() {
        let rule = RecurrenceRule::new(RecurrenceKind::Weekly)
            .on_days([DayOfWeek::Monday, DayOfWeek::Wednesday]);
        // 2026-03-03 is a Tuesday
        let tuesday = at(2026, 3, 3);
        assert_eq!(tuesday.weekday(), Weekday::Tue);
        let next = next_occurrence(Some(&rule), Some(tuesday)).unwrap();
        assert_eq!(next, at(2026, 3, 4));
        assert_eq!(next.weekday(), Weekday::Wed);
    }

    #[test]
    fn weekly_wraps_to_first_day_of_next_week() {
        let rule = RecurrenceRule::new(RecurrenceKind::Weekly)
            .on_days([DayOfWeek::Wednesday, DayOfWeek::Monday]);
        let thursday = at(2026, 3, 5);
        assert_eq!(thursday.weekday(), Weekday::Thu);
        let next = next_occurrence(Some(&rule), Some(thursday)).unwrap();
        assert_eq!(next, at(2026, 3, 9));
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn weekly_single_current_day_repeats_a_week_later() {
        let rule = RecurrenceRule::new(RecurrenceKind::Weekly).on_days([DayOfWeek::Tuesday]);
        let tuesday = at(2026, 3, 3);
        assert_eq!(
            next_occurrence(Some(&rule), Some(tuesday)),
            Some(at(2026, 3, 10))
        );
    }

    #[test]
    fn weekly_from_saturday_wraps_to_sunday() {
        let rule = RecurrenceRule::new(RecurrenceKind::Weekly)
            .on_days([DayOfWeek::Sunday, DayOfWeek::Thursday]);
        let saturday = at(2026, 3, 7);
        assert_eq!(saturday.weekday(), Weekday::Sat);
        assert_eq!(
            next_occurrence(Some(&rule), Some(saturday)),
            Some(at(2026, 3, 8))
        );
    }

    #[test]
    fn weekly_days_ignore_interval() {
        let rule = RecurrenceRule::new(RecurrenceKind::Weekly)
            .every(3)
            .on_days([DayOfWeek::Friday]);
        let monday = at(2026, 3, 2);
        assert_eq!(
            next_occurrence(Some(&rule), Some(monday)),
            Some(at(2026, 3, 6))
        );
    }

    #[test]
    fn monthly_keeps_day_of_month() {
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly);
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 1, 15))),
            Some(at(2026, 2, 15))
        );
        let quarterly = RecurrenceRule::new(RecurrenceKind::Monthly).every(3);
        assert_eq!(
            next_occurrence(Some(&quarterly), Some(at(2026, 11, 10))),
            Some(at(2027, 2, 10))
        );
    }

    #[test]
    fn monthly_forces_rule_day() {
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly).on_day_of_month(5);
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 1, 20))),
            Some(at(2026, 2, 5))
        );
    }

    #[test]
    fn monthly_day_31_into_30_day_month_rolls_to_first_of_next() {
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly).on_day_of_month(31);
        // March has 31 days, April 30: "April 31" becomes May 1
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 3, 31))),
            Some(at(2026, 5, 1))
        );
    }

    #[test]
    fn monthly_without_rule_day_rolls_from_january_31() {
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly);
        // 2026 is not a leap year: "February 31" is March 3
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 1, 31))),
            Some(at(2026, 3, 3))
        );
        // 2028 is: March 2
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2028, 1, 31))),
            Some(at(2028, 3, 2))
        );
    }

    #[test]
    fn monthly_respects_end() {
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly).until(at(2026, 2, 1));
        assert_eq!(next_occurrence(Some(&rule), Some(at(2026, 1, 15))), None);
    }

    #[test]
    fn time_of_day_is_preserved() {
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly);
        let current = Utc.with_ymd_and_hms(2026, 6, 30, 23, 45, 12).unwrap();
        let next = next_occurrence(Some(&rule), Some(current)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 7, 30, 23, 45, 12).unwrap());
    }

    #[test]
    fn huge_interval_ends_series_instead_of_overflowing() {
        let daily = RecurrenceRule::new(RecurrenceKind::Daily).every(u32::MAX);
        assert!(validate_rule(&daily).is_ok());
        assert_eq!(next_occurrence(Some(&daily), Some(at(2026, 1, 1))), None);

        let weekly = RecurrenceRule::new(RecurrenceKind::Weekly).every(u32::MAX);
        assert_eq!(next_occurrence(Some(&weekly), Some(at(2026, 1, 1))), None);

        let monthly = RecurrenceRule::new(RecurrenceKind::Monthly).every(u32::MAX);
        assert_eq!(next_occurrence(Some(&monthly), Some(at(2026, 1, 1))), None);
    }

    #[test]
    fn monthly_near_max_date_ends_series() {
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly).on_day_of_month(31);
        let last = DateTime::<Utc>::MAX_UTC;
        assert_eq!(next_occurrence(Some(&rule), Some(last)), None);
    }

    #[test]
    fn monthly_rule_day_counts_from_following_month() {
        // Jan 31 moves to February first, then takes the rule's day
        let rule = RecurrenceRule::new(RecurrenceKind::Monthly).on_day_of_month(15);
        assert_eq!(
            next_occurrence(Some(&rule), Some(at(2026, 1, 31))),
            Some(at(2026, 2, 15))
        );
    }

    #[test]
    fn validate_rejects_bad_rules() {
        assert!(validate_rule(&RecurrenceRule::new(RecurrenceKind::Daily).every(0)).is_err());
        assert!(validate_rule(
            &RecurrenceRule::new(RecurrenceKind::Monthly).on_day_of_month(32)
        )
        .is_err());
        assert!(validate_rule(
            &RecurrenceRule::new(RecurrenceKind::Monthly).on_day_of_month(31)
        )
        .is_ok());
    }
}
