//! Schedule evaluation
//!
//! Pure functions of a policy and a wall-clock time. They know nothing of
//! `enabled` or force mode; callers filter on those.

use chrono::{DateTime, Datelike, Local};
use discipline_api::BlockMode;
use discipline_config::{Policy, Schedule};
use discipline_util::{local_date, TimeOfDay};

/// Whether the policy's day rule matches `now` and `now` falls inside its
/// daily window (both ends inclusive, overnight windows wrap midnight)
pub fn is_active(policy: &Policy, now: &DateTime<Local>) -> bool {
    let day_matches = match &policy.schedule {
        Schedule::Daily => true,
        Schedule::Weekly(days) => days.contains(now.weekday()),
        Schedule::SpecificDates(dates) => dates.contains(&local_date(now)),
    };

    day_matches && policy.window.contains(TimeOfDay::of(now))
}

/// Whether the policy wants its packages hidden at `now`
pub fn should_restrict(policy: &Policy, now: &DateTime<Local>) -> bool {
    match policy.block_mode {
        BlockMode::HideDuring => is_active(policy, now),
        BlockMode::ShowDuring => !is_active(policy, now),
    }
}

/// Whether the policy contributes to the desired-restricted set at `now`
pub fn is_restricting(policy: &Policy, now: &DateTime<Local>) -> bool {
    policy.enabled && (policy.force_mode || should_restrict(policy, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use discipline_api::{PolicyDocument, ScheduleType};

    // 2025-01-01 is a Wednesday
    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, day, hour, minute, 0).unwrap()
    }

    fn policy(days: &[i64], start: &str, end: &str) -> Policy {
        let mut doc = PolicyDocument::new("test", start, end);
        doc.id = "p".into();
        doc.days_of_week = days.to_vec();
        doc.packages = vec!["com.example.game".into()];
        Policy::from_document(&doc).unwrap()
    }

    const WEEKDAYS: &[i64] = &[2, 3, 4, 5, 6];

    #[test]
    fn weekday_work_hours() {
        let p = policy(WEEKDAYS, "09:00", "17:00");

        // Wednesday 14:00 restricted, Saturday 14:00 not
        assert!(should_restrict(&p, &at(1, 14, 0)));
        assert!(!should_restrict(&p, &at(4, 14, 0)));
    }

    #[test]
    fn window_is_inclusive() {
        let p = policy(WEEKDAYS, "09:00", "17:00");
        assert!(!is_active(&p, &at(1, 8, 59)));
        assert!(is_active(&p, &at(1, 9, 0)));
        assert!(is_active(&p, &at(1, 17, 0)));
        assert!(!is_active(&p, &at(1, 17, 1)));
    }

    #[test]
    fn weekly_matches_iff_day_and_time() {
        let p = policy(WEEKDAYS, "09:00", "17:00");
        // Jan 1..7 2025 cover Wed..Tue
        for day in 1..=7 {
            for (hour, minute) in [(0, 0), (8, 59), (9, 0), (12, 30), (17, 0), (17, 1), (23, 59)] {
                let now = at(day, hour, minute);
                let weekday = now.weekday().number_from_monday() <= 5;
                let minutes = hour * 60 + minute;
                let in_window = (9 * 60..=17 * 60).contains(&minutes);
                assert_eq!(is_active(&p, &now), weekday && in_window, "{}", now);
            }
        }
    }

    #[test]
    fn overnight_window() {
        let p = policy(&[1, 2, 3, 4, 5, 6, 7], "22:00", "07:00");
        assert!(is_active(&p, &at(1, 23, 30)));
        assert!(is_active(&p, &at(1, 6, 30)));
        assert!(!is_active(&p, &at(1, 12, 0)));
        assert!(is_active(&p, &at(1, 22, 0)));
        assert!(is_active(&p, &at(1, 7, 0)));
        assert!(!is_active(&p, &at(1, 7, 1)));
    }

    #[test]
    fn overnight_uses_day_of_now_not_of_window_start() {
        // Only Wednesday; Thursday 01:00 is not covered even though the
        // window opened on Wednesday evening
        let p = policy(&[4], "22:00", "07:00");
        assert!(is_active(&p, &at(1, 23, 0)));
        assert!(!is_active(&p, &at(2, 1, 0)));
        assert!(is_active(&p, &at(1, 1, 0)));
    }

    #[test]
    fn start_equal_end_matches_single_minute() {
        let p = policy(&[1, 2, 3, 4, 5, 6, 7], "12:00", "12:00");
        assert!(is_active(&p, &at(1, 12, 0)));
        assert!(!is_active(&p, &at(1, 11, 59)));
        assert!(!is_active(&p, &at(1, 12, 1)));
    }

    #[test]
    fn show_during_inverts() {
        let hide = policy(WEEKDAYS, "09:00", "17:00");
        let mut show = hide.clone();
        show.block_mode = BlockMode::ShowDuring;

        for day in 1..=7 {
            for hour in 0..24 {
                let now = at(day, hour, 15);
                assert_eq!(should_restrict(&show, &now), !should_restrict(&hide, &now));
            }
        }
    }

    #[test]
    fn daily_ignores_weekday_list() {
        let mut p = policy(&[2], "09:00", "17:00");
        p.schedule = Schedule::Daily;
        assert!(is_active(&p, &at(4, 10, 0)));
    }

    #[test]
    fn specific_dates() {
        let mut doc = PolicyDocument::new("exam", "10:00", "12:00");
        doc.id = "p".into();
        doc.schedule_type = ScheduleType::SpecificDates;
        doc.specific_dates = vec!["2025-01-03".into()];
        let p = Policy::from_document(&doc).unwrap();

        assert!(is_active(&p, &at(3, 11, 0)));
        assert!(!is_active(&p, &at(3, 13, 0)));
        assert!(!is_active(&p, &at(4, 11, 0)));

        doc.specific_dates.clear();
        let never = Policy::from_document(&doc).unwrap();
        assert!(!is_active(&never, &at(3, 11, 0)));
    }

    #[test]
    fn restricting_honours_enabled_and_force() {
        let mut p = policy(WEEKDAYS, "09:00", "17:00");
        let saturday = at(4, 14, 0);
        assert!(!is_restricting(&p, &saturday));

        p.force_mode = true;
        assert!(is_restricting(&p, &saturday));

        p.enabled = false;
        assert!(!is_restricting(&p, &saturday));
        assert!(!is_restricting(&p, &at(1, 14, 0)));
    }
}
