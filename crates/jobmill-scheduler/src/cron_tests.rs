use super::*;
use chrono::TimeZone;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
}

#[test]
fn test_parse_rejects_wrong_field_count() {
    for expr in ["* * * *", "* * * * * *", "", "*"] {
        let result = CronExpr::parse(expr);
        assert!(
            matches!(result, Err(SchedulerError::InvalidCron { .. })),
            "expected rejection for {:?}",
            expr
        );
    }
}

#[test]
fn test_parse_rejects_bad_token() {
    let result = CronExpr::parse("61 * * * *");
    assert!(matches!(result, Err(SchedulerError::InvalidCron { .. })));
}

#[test]
fn test_every_minute_matches_any_second() {
    let cron = CronExpr::parse("* * * * *").unwrap();
    assert!(cron.matches(at(9, 30, 0)));
    assert!(cron.matches(at(9, 30, 17)));
    assert!(cron.matches(at(9, 30, 59)));
}

#[test]
fn test_specific_minute() {
    let cron = CronExpr::parse("30 9 * * *").unwrap();
    assert!(cron.matches(at(9, 30, 0)));
    assert!(cron.matches(at(9, 30, 45)));
    assert!(!cron.matches(at(9, 31, 0)));
    assert!(!cron.matches(at(10, 30, 0)));
}

#[test]
fn test_step_expression() {
    let cron = CronExpr::parse("*/15 * * * *").unwrap();
    assert!(cron.matches(at(9, 0, 0)));
    assert!(cron.matches(at(9, 45, 30)));
    assert!(!cron.matches(at(9, 7, 0)));
}

#[test]
fn test_next_after() {
    let cron = CronExpr::parse("30 9 * * *").unwrap();
    let next = cron.next_after(at(9, 0, 0)).unwrap();
    assert_eq!(next, at(9, 30, 0));

    // Already past today's fire time, rolls to the next day
    let next = cron.next_after(at(9, 30, 0)).unwrap();
    assert!(next > at(9, 30, 0));
    assert_eq!((next.hour(), next.minute()), (9, 30));
}

#[test]
fn test_same_minute() {
    assert!(same_minute(at(9, 30, 1), at(9, 30, 59)));
    assert!(!same_minute(at(9, 30, 59), at(9, 31, 0)));
}
