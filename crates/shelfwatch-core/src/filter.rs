use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use tracing::trace;

use crate::datetime::parse_loan_date;
use crate::loan::Loan;
use crate::status::OverdueStatus;

#[derive(Debug, Clone)]
pub enum Pred {
  Id(u64),
  StatusIs(StatusClass),
  StatusNot(StatusClass),
  BorrowerContains(String),
  TitleContains(String),
  AuthorContains(String),
  IsbnContains(String),
  DueBefore(DateTime<Utc>),
  DueAfter(DateTime<Utc>),
  TextContains(String)
}

/// Status groupings offered by list filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
  All,
  /// Still out and not yet overdue.
  Active,
  /// Any recorded return.
  Returned,
  Overdue,
  ReturnedLate,
  ReturnedOnTime
}

impl StatusClass {
  pub fn parse(
    token: &str
  ) -> Option<Self> {
    match token
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Some(Self::All),
      | "active" | "out" => {
        Some(Self::Active)
      }
      | "returned" => {
        Some(Self::Returned)
      }
      | "overdue" => Some(Self::Overdue),
      | "returned-late" | "late" => {
        Some(Self::ReturnedLate)
      }
      | "on-time" | "ontime" => {
        Some(Self::ReturnedOnTime)
      }
      | _ => None
    }
  }

  #[must_use]
  pub fn contains(
    self,
    status: OverdueStatus
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Active => {
        status == OverdueStatus::Active
      }
      | Self::Returned => {
        status.is_returned()
      }
      | Self::Overdue => {
        status.is_overdue()
      }
      | Self::ReturnedLate => {
        status
          == OverdueStatus::ReturnedLate
      }
      | Self::ReturnedOnTime => {
        status
          == OverdueStatus::ReturnedOnTime
      }
    }
  }
}

#[derive(Debug, Clone)]
enum Expr {
  True,
  Pred(Pred),
  And(Vec<Expr>),
  Or(Vec<Expr>)
}

#[derive(Debug, Clone)]
pub struct Filter {
  expr: Expr
}

impl Default for Filter {
  fn default() -> Self {
    Self {
      expr: Expr::True
    }
  }
}

impl Filter {
  /// Builds a filter from command-line terms.
  ///
  /// Date arguments are resolved against `now` in `tz`; an unparseable one
  /// fails with `LoanError::InvalidDate`.
  #[tracing::instrument(skip(
    terms, now, tz
  ))]
  pub fn parse(
    terms: &[String],
    now: DateTime<Utc>,
    tz: Tz
  ) -> anyhow::Result<Self> {
    if terms.is_empty() {
      return Ok(Self::default());
    }

    let tokens = lex_terms(terms);
    let mut parser =
      Parser::new(tokens, now, tz);
    let expr = parser.parse_expr()?;
    parser.ensure_end()?;

    Ok(Self {
      expr
    })
  }

  /// Restricts to a single status class.
  #[must_use]
  pub fn with_status(
    self,
    class: StatusClass
  ) -> Self {
    let pred =
      Expr::Pred(Pred::StatusIs(class));
    let expr = match self.expr {
      | Expr::True => pred,
      | Expr::And(mut nodes) => {
        nodes.push(pred);
        Expr::And(nodes)
      }
      | other => {
        Expr::And(vec![other, pred])
      }
    };
    Self {
      expr
    }
  }

  pub fn matches(
    &self,
    loan: &Loan,
    now: DateTime<Utc>
  ) -> bool {
    let status = loan.status(now);
    let ok =
      eval_expr(&self.expr, loan, status);
    trace!(
      id = loan.id,
      status = status.label(),
      ok,
      "evaluated filter"
    );
    ok
  }
}

struct Parser {
  tokens: Vec<String>,
  pos:    usize,
  now:    DateTime<Utc>,
  tz:     Tz
}

impl Parser {
  fn new(
    tokens: Vec<String>,
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    Self {
      tokens,
      pos: 0,
      now,
      tz
    }
  }

  fn parse_expr(
    &mut self
  ) -> anyhow::Result<Expr> {
    self.parse_or()
  }

  fn parse_or(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_and()?];

    while self.match_any(&["or", "||"])
    {
      nodes.push(self.parse_and()?);
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::Or(nodes))
    }
  }

  fn parse_and(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_primary()?];

    loop {
      if self.match_any(&["and", "&&"])
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      if self
        .peek_is_implicit_and_boundary()
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      break;
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::And(nodes))
    }
  }

  fn parse_primary(
    &mut self
  ) -> anyhow::Result<Expr> {
    if self.match_token("(") {
      let inner = self.parse_expr()?;
      self.expect_token(")")?;
      return Ok(inner);
    }

    let token = self
      .next_token()
      .ok_or_else(|| {
        anyhow::anyhow!(
          "unexpected end of filter \
           expression"
        )
      })?;

    if token == ")" {
      return Err(anyhow::anyhow!(
        "unexpected ')' in filter \
         expression"
      ));
    }

    let pred = parse_atom(
      &token, self.now, self.tz
    )?;
    Ok(Expr::Pred(pred))
  }

  fn ensure_end(
    &self
  ) -> anyhow::Result<()> {
    if self.pos < self.tokens.len() {
      Err(anyhow::anyhow!(
        "unexpected token in filter \
         expression: {}",
        self.tokens[self.pos]
      ))
    } else {
      Ok(())
    }
  }

  fn match_token(
    &mut self,
    expected: &str
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };
    if tok
      .eq_ignore_ascii_case(expected)
    {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn match_any(
    &mut self,
    options: &[&str]
  ) -> bool {
    options
      .iter()
      .any(|opt| self.match_token(opt))
  }

  fn expect_token(
    &mut self,
    expected: &str
  ) -> anyhow::Result<()> {
    if self.match_token(expected) {
      Ok(())
    } else {
      Err(anyhow::anyhow!(
        "expected '{expected}' in \
         filter expression"
      ))
    }
  }

  fn next_token(
    &mut self
  ) -> Option<String> {
    let out = self
      .tokens
      .get(self.pos)
      .cloned();
    if out.is_some() {
      self.pos += 1;
    }
    out
  }

  fn peek_is_implicit_and_boundary(
    &self
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };

    !tok.eq_ignore_ascii_case("or")
      && !tok.eq_ignore_ascii_case("||")
      && !tok.eq_ignore_ascii_case(")")
  }
}

fn lex_terms(
  terms: &[String]
) -> Vec<String> {
  let mut out = Vec::new();

  for term in terms {
    let mut current = String::new();
    for ch in term.chars() {
      if ch == '(' || ch == ')' {
        if !current.is_empty() {
          out.push(current.clone());
          current.clear();
        }
        out.push(ch.to_string());
      } else {
        current.push(ch);
      }
    }

    if !current.is_empty() {
      out.push(current);
    }
  }

  out
}

fn parse_atom(
  term: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<Pred> {
  if let Some(tag) =
    term.strip_prefix('+')
    && let Some(class) =
      StatusClass::parse(tag)
  {
    return Ok(Pred::StatusIs(class));
  }
  if let Some(tag) =
    term.strip_prefix('-')
    && let Some(class) =
      StatusClass::parse(tag)
  {
    return Ok(Pred::StatusNot(class));
  }
  if term.bytes().all(|b| b.is_ascii_digit())
    && let Ok(id) = term.parse::<u64>()
  {
    return Ok(Pred::Id(id));
  }

  if let Some(status_text) =
    term.strip_prefix("status:")
  {
    let class = StatusClass::parse(
      status_text
    )
    .ok_or_else(|| {
      anyhow::anyhow!(
        "unknown status filter: \
         {status_text} (expected all, \
         active, returned, overdue, \
         returned-late or on-time)"
      )
    })?;
    return Ok(Pred::StatusIs(class));
  }

  let fields: [(&str, fn(String) -> Pred); 4] = [
    ("borrower:", Pred::BorrowerContains),
    ("title:", Pred::TitleContains),
    ("author:", Pred::AuthorContains),
    ("isbn:", Pred::IsbnContains)
  ];
  for (prefix, make) in fields {
    if let Some(value) =
      term.strip_prefix(prefix)
    {
      return Ok(make(
        value.to_lowercase()
      ));
    }
  }

  if let Some(value) =
    term.strip_prefix("due.before:")
  {
    return Ok(Pred::DueBefore(
      parse_loan_date(value, now, tz)
        .map_err(|e| {
          e.in_field("due.before")
        })?
    ));
  }

  if let Some(value) =
    term.strip_prefix("due.after:")
  {
    return Ok(Pred::DueAfter(
      parse_loan_date(value, now, tz)
        .map_err(|e| {
          e.in_field("due.after")
        })?
    ));
  }

  Ok(Pred::TextContains(
    term.to_lowercase()
  ))
}

fn eval_expr(
  expr: &Expr,
  loan: &Loan,
  status: OverdueStatus
) -> bool {
  match expr {
    | Expr::True => true,
    | Expr::Pred(pred) => {
      eval_pred(pred, loan, status)
    }
    | Expr::And(nodes) => {
      nodes.iter().all(|node| {
        eval_expr(node, loan, status)
      })
    }
    | Expr::Or(nodes) => {
      nodes.iter().any(|node| {
        eval_expr(node, loan, status)
      })
    }
  }
}

fn eval_pred(
  pred: &Pred,
  loan: &Loan,
  status: OverdueStatus
) -> bool {
  match pred {
    | Pred::Id(id) => loan.id == *id,
    | Pred::StatusIs(class) => {
      class.contains(status)
    }
    | Pred::StatusNot(class) => {
      !class.contains(status)
    }
    | Pred::BorrowerContains(text) => {
      contains_folded(
        &loan.borrower,
        text
      )
    }
    | Pred::TitleContains(text) => {
      contains_folded(&loan.title, text)
    }
    | Pred::AuthorContains(text) => {
      loan.author.as_deref().is_some_and(
        |author| {
          contains_folded(author, text)
        }
      )
    }
    | Pred::IsbnContains(text) => {
      loan.isbn.as_deref().is_some_and(
        |isbn| contains_folded(isbn, text)
      )
    }
    | Pred::DueBefore(dt) => {
      loan.due < *dt
    }
    | Pred::DueAfter(dt) => {
      loan.due > *dt
    }
    | Pred::TextContains(text) => {
      contains_folded(
        &loan.borrower,
        text
      ) || contains_folded(
        &loan.title,
        text
      ) || [
        loan.author.as_deref(),
        loan.isbn.as_deref()
      ]
      .into_iter()
      .flatten()
      .any(|field| {
        contains_folded(field, text)
      })
    }
  }
}

fn contains_folded(
  haystack: &str,
  needle_lower: &str
) -> bool {
  haystack
    .to_lowercase()
    .contains(needle_lower)
}
