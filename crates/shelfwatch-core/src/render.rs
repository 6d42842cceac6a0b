use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_date;
use crate::loan::Loan;
use crate::status::{LoanRecord, OverdueStatus};
use crate::summary::Summary;

/// Display text and ANSI color for a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub color: Option<&'static str>,
}

impl Badge {
    pub fn for_status(status: OverdueStatus) -> Self {
        let (text, color) = match status {
            OverdueStatus::Active => ("on loan".to_string(), Some("32")),
            OverdueStatus::ReturnedOnTime => ("returned".to_string(), None),
            OverdueStatus::ReturnedLate => ("returned late".to_string(), Some("33")),
            OverdueStatus::Overdue(_) => (status.to_string(), Some("31")),
        };
        Self { text, color }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true) && io::stdout().is_terminal();

        Ok(Self { color, tz })
    }

    pub fn plain(tz: Tz) -> Self {
        Self { color: false, tz }
    }

    #[tracing::instrument(skip(self, out, loans, now), fields(count = loans.len()))]
    pub fn write_loan_table<W: Write>(
        &self,
        out: &mut W,
        loans: &[Loan],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let headers = ["ID", "Borrower", "Title", "Due", "Returned", "Status"]
            .map(ToString::to_string)
            .to_vec();

        let rows = loans
            .iter()
            .map(|loan| {
                let status = loan.status(now);
                let badge = Badge::for_status(status);
                let due = format_date(loan.due, self.tz);
                let due = if status.is_overdue() {
                    self.paint(&due, "31")
                } else {
                    due
                };
                vec![
                    self.paint(&loan.id.to_string(), "33"),
                    loan.borrower.clone(),
                    loan.title.clone(),
                    due,
                    loan.returned
                        .map(|r| format_date(r, self.tz))
                        .unwrap_or_default(),
                    self.paint_badge(&badge),
                ]
            })
            .collect();

        write_table(out, headers, rows)?;
        Ok(())
    }

    pub fn write_summary<W: Write>(&self, out: &mut W, summary: &Summary) -> anyhow::Result<()> {
        writeln!(out, "total        {}", summary.total)?;
        writeln!(out, "on loan      {}", summary.active)?;
        writeln!(
            out,
            "overdue      {}",
            if summary.overdue > 0 {
                self.paint(&summary.overdue.to_string(), "31")
            } else {
                "0".to_string()
            }
        )?;
        writeln!(out, "outstanding  {}", summary.outstanding())?;
        writeln!(out, "returned     {}", summary.returned_on_time)?;
        writeln!(out, "late return  {}", summary.returned_late)?;
        if summary.max_days_overdue > 0 {
            writeln!(out, "max overdue  {} days", summary.max_days_overdue)?;
        }
        Ok(())
    }

    pub fn write_classification<W: Write>(
        &self,
        out: &mut W,
        record: &LoanRecord,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let status = record.classify(now);
        writeln!(out, "status        {}", self.paint_badge(&Badge::for_status(status)))?;
        writeln!(out, "due           {}", format_date(record.due, self.tz))?;
        if let Some(returned) = record.returned {
            writeln!(out, "returned      {}", format_date(returned, self.tz))?;
            writeln!(out, "days late     {}", record.days_late())?;
        } else {
            writeln!(out, "days overdue  {}", record.days_overdue(now))?;
            writeln!(out, "days left     {}", record.days_until_due(now))?;
        }
        Ok(())
    }

    fn paint_badge(&self, badge: &Badge) -> String {
        match badge.color {
            Some(code) => self.paint(&badge.text, code),
            None => badge.text.clone(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Badge, Renderer, strip_ansi, write_table};
    use crate::config::Config;
    use crate::loan::{Loan, RawLoan};
    use crate::status::OverdueStatus;

    #[test]
    fn badge_lookup() {
        assert_eq!(Badge::for_status(OverdueStatus::Overdue(5)).text, "overdue 5 days");
        assert_eq!(Badge::for_status(OverdueStatus::Overdue(5)).color, Some("31"));
        assert_eq!(Badge::for_status(OverdueStatus::Active).text, "on loan");
        assert_eq!(Badge::for_status(OverdueStatus::ReturnedOnTime).color, None);
    }

    #[test]
    fn color_setting_goes_through_config_bools() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg, chrono_tz::UTC).expect("renderer");
        assert!(!renderer.color);

        cfg.apply_overrides([("color".to_string(), "sometimes".to_string())]);
        let err = Renderer::new(&cfg, chrono_tz::UTC).expect_err("bad color value");
        assert!(err.to_string().contains("invalid color setting"));
    }

    #[test]
    fn table_aligns_wide_characters() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            vec!["Title".to_string(), "Due".to_string()],
            vec![
                vec!["红楼梦".to_string(), "2024-01-10".to_string()],
                vec!["Ulysses".to_string(), "\x1b[31m2024-01-11\x1b[0m".to_string()],
            ],
        )
        .expect("write table");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Title   Due        ");
        assert_eq!(lines[2], "红楼梦  2024-01-10 ");
        assert_eq!(strip_ansi(lines[3]), "Ulysses 2024-01-11 ");
    }

    #[test]
    fn loan_table_shows_overdue_badge() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).single().expect("valid now");
        let loan = Loan::from_raw(
            RawLoan {
                id: 1,
                borrower: "reader".to_string(),
                title: "Rickshaw Boy".to_string(),
                author: None,
                isbn: None,
                borrowed: None,
                due: "2024-01-10".to_string(),
                returned: None,
            },
            chrono_tz::UTC,
            now,
        )
        .expect("valid loan");

        let mut out = Vec::new();
        Renderer::plain(chrono_tz::UTC)
            .write_loan_table(&mut out, &[loan], now)
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("Rickshaw Boy"));
        assert!(text.contains("overdue 5 days"));
        assert!(!text.contains('\x1b'));
    }
}
