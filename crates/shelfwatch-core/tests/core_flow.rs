use std::fs;

use chrono::{DateTime, Duration, TimeZone, Utc};
use shelfwatch_core::filter::Filter;
use shelfwatch_core::loans::{LoanSource, load_loans};
use shelfwatch_core::sort::{parse_sort_specs, sort_loans};
use shelfwatch_core::summary::Summary;
use shelfwatch_core::{FixedClock, LoanError, LoanRecord, OverdueStatus, classify};
use tempfile::tempdir;

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().expect("valid date")
}

#[test]
fn documented_scenarios() {
    let due = day(2024, 1, 10);

    assert_eq!(classify(due, None, day(2024, 1, 15)), OverdueStatus::Overdue(5));
    assert_eq!(classify(due, Some(day(2024, 1, 9)), day(2099, 1, 1)), OverdueStatus::ReturnedOnTime);
    assert_eq!(classify(due, Some(day(2024, 1, 12)), day(2000, 1, 1)), OverdueStatus::ReturnedLate);
    assert_eq!(classify(due, None, due), OverdueStatus::Active);
}

#[test]
fn overdue_days_match_floor_of_elapsed_millis() {
    let due = day(2024, 1, 10);
    for minutes in [1_440_i64, 2_000, 2_879, 2_880, 10_081, 525_600] {
        let now = due + Duration::minutes(minutes);
        let expected = u32::try_from(minutes * 60_000 / 86_400_000).expect("fits");
        assert_eq!(classify(due, None, now), OverdueStatus::Overdue(expected));
    }
}

#[test]
fn returned_records_ignore_clock() {
    let record = LoanRecord::new(day(2024, 1, 10), Some(day(2024, 1, 10)));
    for now in [day(1999, 1, 1), day(2024, 1, 10), day(2100, 1, 1)] {
        assert_eq!(record.classify_with(FixedClock(now)), OverdueStatus::ReturnedOnTime);
    }
}

#[test]
fn listing_flow_filter_sort_and_tally() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("loans.jsonl");
    fs::write(
        &path,
        concat!(
            "{\"id\":1,\"borrower\":\"admin\",\"title\":\"Camel Xiangzi\",\"due\":\"2024-01-01\",\"returned\":\"2024-01-08\"}\n",
            "{\"id\":2,\"borrower\":\"librarian\",\"title\":\"Teahouse\",\"due\":\"2024-01-22\"}\n",
            "{\"id\":3,\"borrower\":\"reader\",\"title\":\"Family\",\"due\":\"2024-01-29\"}\n",
            "{\"id\":4,\"borrower\":\"reader\",\"title\":\"Midnight\",\"due\":\"2024-01-14\"}\n",
            "{\"id\":5,\"borrower\":\"reader\",\"title\":\"Spring Silkworms\",\"due\":\"2024-01-04\",\"returned\":\"\"}\n",
        ),
    )
    .expect("write loans");

    let now = day(2024, 1, 15);
    let mut loans = load_loans(&LoanSource::File(path), chrono_tz::UTC, now).expect("load loans");
    assert_eq!(loans.len(), 5);

    let filter = Filter::parse(&["reader".to_string(), "+overdue".to_string()], now, chrono_tz::UTC)
        .expect("parse filter");
    loans.retain(|loan| filter.matches(loan, now));
    sort_loans(&mut loans, &parse_sort_specs("overdue-"), now);

    let ids: Vec<u64> = loans.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![5, 4]);
    assert_eq!(loans[0].status(now), OverdueStatus::Overdue(11));
    assert_eq!(loans[1].status(now), OverdueStatus::Overdue(1));

    let all = load_loans(
        &LoanSource::File(temp.path().join("loans.jsonl")),
        chrono_tz::UTC,
        now,
    )
    .expect("reload loans");
    let summary = Summary::tally(&all, now);
    assert_eq!(summary.total, 5);
    assert_eq!(summary.overdue, 2);
    assert_eq!(summary.active, 2);
    assert_eq!(summary.returned_late, 1);
    assert_eq!(summary.outstanding(), 4);
}

#[test]
fn unparseable_due_date_is_an_error_not_active() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("loans.json");
    fs::write(&path, "[{\"id\":1,\"due\":\"2024-01-10\"},{\"id\":2,\"due\":\"31/12/2023\"}]")
        .expect("write loans");

    let err = load_loans(&LoanSource::File(path), chrono_tz::UTC, day(2024, 1, 15))
        .expect_err("invalid due date");
    let cause = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<LoanError>())
        .expect("loan error in chain");
    let LoanError::InvalidDate { field, input, .. } = cause;
    assert_eq!(field, "due");
    assert_eq!(input, "31/12/2023");
}
