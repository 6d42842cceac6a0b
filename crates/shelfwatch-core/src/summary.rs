use chrono::{
  DateTime,
  Utc
};
use serde::Serialize;

use crate::loan::Loan;
use crate::status::OverdueStatus;

/// Per-status counters for a set of loans.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize,
)]
pub struct Summary {
  pub total:            usize,
  pub active:           usize,
  pub overdue:          usize,
  pub returned_on_time: usize,
  pub returned_late:    usize,
  /// Longest current overdue run, in days.
  pub max_days_overdue: u32
}

impl Summary {
  #[tracing::instrument(skip(loans, now), fields(count = loans.len()))]
  pub fn tally(
    loans: &[Loan],
    now: DateTime<Utc>
  ) -> Self {
    loans.iter().fold(
      Self::default(),
      |mut acc, loan| {
        acc.record(loan.status(now));
        acc
      }
    )
  }

  pub fn record(
    &mut self,
    status: OverdueStatus
  ) {
    self.total += 1;
    match status {
      | OverdueStatus::Active => {
        self.active += 1;
      }
      | OverdueStatus::ReturnedOnTime => {
        self.returned_on_time += 1;
      }
      | OverdueStatus::ReturnedLate => {
        self.returned_late += 1;
      }
      | OverdueStatus::Overdue(days) => {
        self.overdue += 1;
        self.max_days_overdue =
          self.max_days_overdue.max(days);
      }
    }
  }

  /// Books still out, overdue or not.
  #[must_use]
  pub fn outstanding(&self) -> usize {
    self.active + self.overdue
  }
}
