//! Loan status derivation.
//!
//! Everything here is pure: the reference instant is always passed in, never
//! read from the platform clock.

use std::fmt;

use chrono::{
  DateTime,
  Utc
};

use crate::clock::Clock;

/// The two dates status derivation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanRecord {
  pub due:      DateTime<Utc>,
  pub returned: Option<DateTime<Utc>>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverdueStatus {
  Active,
  ReturnedOnTime,
  ReturnedLate,
  /// Whole days past due; never zero.
  Overdue(u32)
}

/// Derives the status of a loan at `now`.
///
/// A loan whose due instant passed less than a full day ago is still
/// `Active`, so `Overdue` always carries at least one day.
#[must_use]
pub fn classify(
  due: DateTime<Utc>,
  returned: Option<DateTime<Utc>>,
  now: DateTime<Utc>
) -> OverdueStatus {
  if let Some(returned) = returned {
    return if returned <= due {
      OverdueStatus::ReturnedOnTime
    } else {
      OverdueStatus::ReturnedLate
    };
  }

  if now <= due {
    return OverdueStatus::Active;
  }

  match whole_days_between(due, now) {
    | 0 => OverdueStatus::Active,
    | days => {
      OverdueStatus::Overdue(days)
    }
  }
}

/// Whole days from `from` to `to`, rounded down. Zero when `to` is not
/// after `from`.
#[must_use]
pub fn whole_days_between(
  from: DateTime<Utc>,
  to: DateTime<Utc>
) -> u32 {
  let days = to
    .signed_duration_since(from)
    .num_days();
  if days <= 0 {
    0
  } else {
    u32::try_from(days)
      .unwrap_or(u32::MAX)
  }
}

impl LoanRecord {
  #[must_use]
  pub fn new(
    due: DateTime<Utc>,
    returned: Option<DateTime<Utc>>
  ) -> Self {
    Self {
      due,
      returned
    }
  }

  #[must_use]
  pub fn classify(
    &self,
    now: DateTime<Utc>
  ) -> OverdueStatus {
    classify(
      self.due,
      self.returned,
      now
    )
  }

  /// Same as [`LoanRecord::classify`] with `now` taken from `clock`.
  pub fn classify_with<C: Clock>(
    &self,
    clock: C
  ) -> OverdueStatus {
    self.classify(clock.now())
  }

  #[must_use]
  pub fn days_overdue(
    &self,
    now: DateTime<Utc>
  ) -> u32 {
    match self.classify(now) {
      | OverdueStatus::Overdue(days) => {
        days
      }
      | _ => 0
    }
  }

  /// Whole days a late return came in after the due date.
  #[must_use]
  pub fn days_late(&self) -> u32 {
    match self.returned {
      | Some(returned)
        if returned > self.due =>
      {
        whole_days_between(
          self.due, returned
        )
      }
      | _ => 0
    }
  }

  /// Whole days left before the loan falls due; 0 once due or returned.
  #[must_use]
  pub fn days_until_due(
    &self,
    now: DateTime<Utc>
  ) -> u32 {
    if self.returned.is_some() {
      return 0;
    }
    whole_days_between(now, self.due)
  }
}

impl OverdueStatus {
  #[must_use]
  pub fn is_returned(self) -> bool {
    matches!(
      self,
      Self::ReturnedOnTime
        | Self::ReturnedLate
    )
  }

  #[must_use]
  pub fn is_overdue(self) -> bool {
    matches!(self, Self::Overdue(_))
  }

  #[must_use]
  pub fn is_terminal(self) -> bool {
    self.is_returned()
  }

  /// Stable keyword, used by filters, sorting and JSON export.
  #[must_use]
  pub fn label(self) -> &'static str {
    match self {
      | Self::Active => "active",
      | Self::ReturnedOnTime => {
        "returned"
      }
      | Self::ReturnedLate => {
        "returned-late"
      }
      | Self::Overdue(_) => "overdue"
    }
  }

  /// Whether a record in this state can be observed next in `next`.
  ///
  /// Re-evaluating without an event is always allowed; overdue day counts
  /// only grow.
  #[must_use]
  pub fn can_transition_to(
    self,
    next: Self
  ) -> bool {
    match (self, next) {
      | (a, b) if a == b => true,
      | (
        Self::Active,
        Self::ReturnedOnTime
        | Self::ReturnedLate
        | Self::Overdue(_)
      ) => true,
      | (
        Self::Overdue(_),
        Self::ReturnedOnTime
        | Self::ReturnedLate
      ) => true,
      | (
        Self::Overdue(before),
        Self::Overdue(after)
      ) => after >= before,
      | _ => false
    }
  }
}

impl fmt::Display for OverdueStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::Overdue(1) => {
        write!(f, "overdue 1 day")
      }
      | Self::Overdue(days) => {
        write!(f, "overdue {days} days")
      }
      | other => {
        f.write_str(other.label())
      }
    }
  }
}
