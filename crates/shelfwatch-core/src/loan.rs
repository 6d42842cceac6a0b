use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::datetime::{format_date, parse_loan_date};
use crate::error::LoanError;
use crate::status::{LoanRecord, OverdueStatus};

/// A loan row as it arrives from a listing: dates are still text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawLoan {
    pub id: u64,

    #[serde(default)]
    pub borrower: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub isbn: Option<String>,

    #[serde(default)]
    pub borrowed: Option<String>,

    pub due: String,

    #[serde(default)]
    pub returned: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    pub id: u64,
    pub borrower: String,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub borrowed: Option<DateTime<Utc>>,
    pub due: DateTime<Utc>,
    pub returned: Option<DateTime<Utc>>,
}

/// Export shape: the loan plus its status at the evaluation instant.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedLoan<'a> {
    pub id: u64,
    pub borrower: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<&'a str>,
    pub due: String,
    pub returned: Option<String>,
    pub status: &'static str,
    pub days_overdue: u32,
    pub days_late: u32,
    pub days_until_due: u32,
}

impl Loan {
    /// Parses every date of `raw`; the first bad one fails the whole row.
    ///
    /// A blank `returned` value means the book is still out.
    pub fn from_raw(raw: RawLoan, tz: Tz, now: DateTime<Utc>) -> Result<Self, LoanError> {
        let due = parse_loan_date(&raw.due, now, tz).map_err(|e| e.in_field("due"))?;
        let returned = parse_optional(raw.returned.as_deref(), tz, now, "returned")?;
        let borrowed = parse_optional(raw.borrowed.as_deref(), tz, now, "borrowed")?;

        Ok(Self {
            id: raw.id,
            borrower: raw.borrower,
            title: raw.title,
            author: raw.author.filter(|a| !a.trim().is_empty()),
            isbn: raw.isbn.filter(|i| !i.trim().is_empty()),
            borrowed,
            due,
            returned,
        })
    }

    pub fn record(&self) -> LoanRecord {
        LoanRecord::new(self.due, self.returned)
    }

    pub fn status(&self, now: DateTime<Utc>) -> OverdueStatus {
        self.record().classify(now)
    }

    pub fn classified(&self, now: DateTime<Utc>, tz: Tz) -> ClassifiedLoan<'_> {
        let record = self.record();
        ClassifiedLoan {
            id: self.id,
            borrower: &self.borrower,
            title: &self.title,
            author: self.author.as_deref(),
            isbn: self.isbn.as_deref(),
            due: format_date(self.due, tz),
            returned: self.returned.map(|r| format_date(r, tz)),
            status: record.classify(now).label(),
            days_overdue: record.days_overdue(now),
            days_late: record.days_late(),
            days_until_due: record.days_until_due(now),
        }
    }
}

fn parse_optional(
    raw: Option<&str>,
    tz: Tz,
    now: DateTime<Utc>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, LoanError> {
    match raw.map(str::trim) {
        Some(text) if !text.is_empty() => parse_loan_date(text, now, tz)
            .map(Some)
            .map_err(|e| e.in_field(field)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Loan, RawLoan};
    use crate::error::LoanError;
    use crate::status::OverdueStatus;

    fn raw(due: &str, returned: Option<&str>) -> RawLoan {
        RawLoan {
            id: 7,
            borrower: "reader".to_string(),
            title: "Dream of the Red Chamber".to_string(),
            author: Some("Cao Xueqin".to_string()),
            isbn: Some(" ".to_string()),
            borrowed: Some("2023-12-27".to_string()),
            due: due.to_string(),
            returned: returned.map(ToString::to_string),
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn blank_return_means_still_out() {
        let loan = Loan::from_raw(raw("2024-01-10", Some("  ")), chrono_tz::UTC, now())
            .expect("valid loan");
        assert_eq!(loan.returned, None);
        assert_eq!(loan.isbn, None);
        assert_eq!(loan.status(now()), OverdueStatus::Overdue(5));
    }

    #[test]
    fn bad_due_date_fails_fast() {
        let err = Loan::from_raw(raw("soon", None), chrono_tz::UTC, now())
            .expect_err("invalid due");
        let LoanError::InvalidDate { field, input, .. } = err;
        assert_eq!(field, "due");
        assert_eq!(input, "soon");
    }

    #[test]
    fn bad_return_date_names_field() {
        let err = Loan::from_raw(raw("2024-01-10", Some("yesterdayish")), chrono_tz::UTC, now())
            .expect_err("invalid returned");
        let LoanError::InvalidDate { field, .. } = err;
        assert_eq!(field, "returned");
    }

    #[test]
    fn classified_export_carries_counts() {
        let loan = Loan::from_raw(raw("2024-01-10", Some("2024-01-12")), chrono_tz::UTC, now())
            .expect("valid loan");
        let out = loan.classified(now(), chrono_tz::UTC);
        assert_eq!(out.status, "returned-late");
        assert_eq!(out.days_late, 2);
        assert_eq!(out.days_overdue, 0);
        assert_eq!(out.returned.as_deref(), Some("2024-01-12"));

        let json = serde_json::to_value(&out).expect("serialize");
        assert_eq!(json["status"], "returned-late");
        assert!(json.get("isbn").is_none());
    }
}
