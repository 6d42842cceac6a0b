use std::cmp::Ordering;

use chrono::{
  DateTime,
  Utc
};
use tracing::warn;

use crate::loan::Loan;
use crate::status::OverdueStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
  Id,
  Due,
  Returned,
  Borrowed,
  Title,
  Borrower,
  Author,
  Status,
  Overdue
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
  pub key:        SortKey,
  pub descending: bool
}

impl SortKey {
  fn parse(
    token: &str
  ) -> Option<Self> {
    match token
      .to_ascii_lowercase()
      .as_str()
    {
      | "id" => Some(Self::Id),
      | "due" => Some(Self::Due),
      | "returned" | "return" => {
        Some(Self::Returned)
      }
      | "borrowed" => {
        Some(Self::Borrowed)
      }
      | "title" => Some(Self::Title),
      | "borrower" | "user" => {
        Some(Self::Borrower)
      }
      | "author" => Some(Self::Author),
      | "status" => Some(Self::Status),
      | "overdue" => {
        Some(Self::Overdue)
      }
      | _ => None
    }
  }
}

/// Parses `field[+|-]` items separated by commas or whitespace.
///
/// Unknown fields are skipped with a warning.
pub fn parse_sort_specs(
  raw: &str
) -> Vec<SortSpec> {
  raw
    .split(',')
    .flat_map(str::split_whitespace)
    .filter(|token| !token.is_empty())
    .filter_map(|token| {
      let (field, descending) =
        if let Some(field) =
          token.strip_suffix('-')
        {
          (field, true)
        } else if let Some(field) =
          token.strip_suffix('+')
        {
          (field, false)
        } else {
          (token, false)
        };
      let Some(key) =
        SortKey::parse(field)
      else {
        warn!(
          field,
          "unknown sort field; ignoring"
        );
        return None;
      };
      Some(SortSpec {
        key,
        descending
      })
    })
    .collect()
}

#[tracing::instrument(skip(loans, specs, now), fields(count = loans.len()))]
pub fn sort_loans(
  loans: &mut [Loan],
  specs: &[SortSpec],
  now: DateTime<Utc>
) {
  loans.sort_by(|a, b| {
    compare_loans(a, b, specs, now)
  });
}

fn compare_loans(
  a: &Loan,
  b: &Loan,
  specs: &[SortSpec],
  now: DateTime<Utc>
) -> Ordering {
  for spec in specs {
    let ordering =
      compare_on_key(a, b, spec.key, now);
    if ordering != Ordering::Equal {
      return if spec.descending {
        ordering.reverse()
      } else {
        ordering
      };
    }
  }

  a.id.cmp(&b.id)
}

fn compare_on_key(
  a: &Loan,
  b: &Loan,
  key: SortKey,
  now: DateTime<Utc>
) -> Ordering {
  match key {
    | SortKey::Id => a.id.cmp(&b.id),
    | SortKey::Due => a.due.cmp(&b.due),
    | SortKey::Returned => {
      cmp_optional(
        a.returned.as_ref(),
        b.returned.as_ref()
      )
    }
    | SortKey::Borrowed => {
      cmp_optional(
        a.borrowed.as_ref(),
        b.borrowed.as_ref()
      )
    }
    | SortKey::Title => {
      a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
    }
    | SortKey::Borrower => {
      a.borrower
        .to_lowercase()
        .cmp(&b.borrower.to_lowercase())
    }
    | SortKey::Author => {
      cmp_optional(
        a.author
          .as_ref()
          .map(|s| s.to_lowercase())
          .as_ref(),
        b.author
          .as_ref()
          .map(|s| s.to_lowercase())
          .as_ref()
      )
    }
    | SortKey::Status => {
      status_rank(a.status(now)).cmp(
        &status_rank(b.status(now))
      )
    }
    | SortKey::Overdue => {
      a.record()
        .days_overdue(now)
        .cmp(
          &b.record().days_overdue(now)
        )
    }
  }
}

/// Most urgent first: overdue, active, late returns, on-time returns.
fn status_rank(
  status: OverdueStatus
) -> u8 {
  match status {
    | OverdueStatus::Overdue(_) => 0,
    | OverdueStatus::Active => 1,
    | OverdueStatus::ReturnedLate => 2,
    | OverdueStatus::ReturnedOnTime => {
      3
    }
  }
}

fn cmp_optional<T: Ord>(
  left: Option<&T>,
  right: Option<&T>
) -> Ordering {
  match (left, right) {
    | (Some(a), Some(b)) => a.cmp(b),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    TimeZone,
    Utc
  };

  use super::{
    SortKey,
    SortSpec,
    parse_sort_specs,
    sort_loans
  };
  use crate::loan::{
    Loan,
    RawLoan
  };

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2024, 1, 15, 0, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn loan(
    id: u64,
    title: &str,
    due: &str,
    returned: Option<&str>
  ) -> Loan {
    Loan::from_raw(
      RawLoan {
        id,
        borrower: format!("user{id}"),
        title: title.to_string(),
        author: None,
        isbn: None,
        borrowed: None,
        due: due.to_string(),
        returned: returned
          .map(ToString::to_string)
      },
      chrono_tz::UTC,
      now()
    )
    .expect("valid loan")
  }

  fn ids(loans: &[Loan]) -> Vec<u64> {
    loans.iter().map(|l| l.id).collect()
  }

  #[test]
  fn parses_specs_and_skips_unknown() {
    assert_eq!(
      parse_sort_specs(
        "overdue-, title+ bogus,due"
      ),
      vec![
        SortSpec {
          key:        SortKey::Overdue,
          descending: true
        },
        SortSpec {
          key:        SortKey::Title,
          descending: false
        },
        SortSpec {
          key:        SortKey::Due,
          descending: false
        }
      ]
    );
    assert!(parse_sort_specs("").is_empty());
  }

  #[test]
  fn sorts_by_overdue_days_desc() {
    let mut loans = vec![
      loan(1, "b", "2024-01-12", None),
      loan(2, "a", "2024-01-01", None),
      loan(3, "c", "2024-01-30", None),
      loan(4, "d", "2024-01-13", None),
    ];
    sort_loans(
      &mut loans,
      &parse_sort_specs("overdue-"),
      now()
    );
    assert_eq!(
      ids(&loans),
      vec![2, 1, 4, 3]
    );
  }

  #[test]
  fn title_sort_ignores_case_and_ties_on_id()
  {
    let mut loans = vec![
      loan(3, "beta", "2024-01-20", None),
      loan(1, "Beta", "2024-01-20", None),
      loan(2, "Alpha", "2024-01-20", None),
    ];
    sort_loans(
      &mut loans,
      &parse_sort_specs("title"),
      now()
    );
    assert_eq!(
      ids(&loans),
      vec![2, 1, 3]
    );
  }

  #[test]
  fn status_sort_puts_overdue_first() {
    let mut loans = vec![
      loan(1, "a", "2024-01-10", Some("2024-01-09")),
      loan(2, "b", "2024-01-10", Some("2024-01-11")),
      loan(3, "c", "2024-01-30", None),
      loan(4, "d", "2024-01-01", None),
    ];
    sort_loans(
      &mut loans,
      &parse_sort_specs("status"),
      now()
    );
    assert_eq!(
      ids(&loans),
      vec![4, 3, 2, 1]
    );
  }
}
