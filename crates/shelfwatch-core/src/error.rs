use thiserror::Error;

/// Failure raised while turning loan date text into an instant.
///
/// Callers must propagate this rather than treat the record as "not
/// overdue".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoanError {
  #[error(
    "invalid date in {field}: {input:?} ({reason})"
  )]
  InvalidDate {
    field:  String,
    input:  String,
    reason: String
  }
}

impl LoanError {
  pub fn invalid_date(
    field: impl Into<String>,
    input: impl Into<String>,
    reason: impl Into<String>
  ) -> Self {
    Self::InvalidDate {
      field:  field.into(),
      input:  input.into(),
      reason: reason.into()
    }
  }

  /// Re-labels the field an error refers to, keeping input and reason.
  #[must_use]
  pub fn in_field(
    self,
    field: impl Into<String>
  ) -> Self {
    match self {
      | Self::InvalidDate {
        input,
        reason,
        ..
      } => {
        Self::InvalidDate {
          field: field.into(),
          input,
          reason
        }
      }
    }
  }
}
