//! Typed query-builder AST.
//!
//! Composed queries are built as expression trees and rendered to
//! parameterized SQL in a single pass. Values are always emitted as bound
//! parameters — never interpolated into the query text — so a configuration
//! string can not change the shape of a query.

// ─── Values ──────────────────────────────────────────────────────────────────

/// A literal bound into a rendered query.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Text(String),
  Integer(i64),
  Real(f64),
}

// ─── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Eq,
  Gt,
  Add,
  Mul,
  Div,
}

impl BinaryOp {
  fn sql(self) -> &'static str {
    match self {
      Self::Eq => "=",
      Self::Gt => ">",
      Self::Add => "+",
      Self::Mul => "*",
      Self::Div => "/",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
  Sum,
  Avg,
}

impl AggregateFn {
  fn sql(self) -> &'static str {
    match self {
      Self::Sum => "sum",
      Self::Avg => "avg",
    }
  }
}

/// An expression node.
#[derive(Debug, Clone)]
pub enum Expr {
  /// A column reference, optionally table-qualified.
  Column {
    table: Option<String>,
    name:  String,
  },
  /// A literal, rendered as a bound parameter.
  Literal(Value),
  /// Lookup of a key in the semi-structured `tags` column.
  Tag(String),
  Binary {
    op:  BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  And(Vec<Expr>),
  Or(Vec<Expr>),
  IsNotNull(Box<Expr>),
  In {
    expr:   Box<Expr>,
    values: Vec<Value>,
  },
  Case {
    whens:     Vec<(Expr, Expr)>,
    otherwise: Option<Box<Expr>>,
  },
  Coalesce(Vec<Expr>),
  /// Ceiling to the nearest integer. Rendered with the integer-cast form
  /// because SQLite math functions are compile-time optional.
  Ceil(Box<Expr>),
  /// Cast to REAL; guards against integer division.
  ToReal(Box<Expr>),
  Aggregate {
    func: AggregateFn,
    arg:  Box<Expr>,
  },
  CountAll,
  /// `count(CASE WHEN predicate THEN 1 END)` — rows matching a predicate.
  CountIf(Box<Expr>),
}

impl Expr {
  pub fn column(name: impl Into<String>) -> Self {
    Self::Column { table: None, name: name.into() }
  }

  pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
    Self::Column { table: Some(table.into()), name: name.into() }
  }

  pub fn text(value: impl Into<String>) -> Self {
    Self::Literal(Value::Text(value.into()))
  }

  pub fn integer(value: i64) -> Self { Self::Literal(Value::Integer(value)) }

  pub fn real(value: f64) -> Self { Self::Literal(Value::Real(value)) }

  pub fn tag(key: impl Into<String>) -> Self { Self::Tag(key.into()) }

  fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
    Self::Binary { op, lhs: Box::new(self), rhs: Box::new(rhs) }
  }

  pub fn eq(self, rhs: Expr) -> Self { self.binary(BinaryOp::Eq, rhs) }

  pub fn gt(self, rhs: Expr) -> Self { self.binary(BinaryOp::Gt, rhs) }

  pub fn add(self, rhs: Expr) -> Self { self.binary(BinaryOp::Add, rhs) }

  pub fn mul(self, rhs: Expr) -> Self { self.binary(BinaryOp::Mul, rhs) }

  pub fn div(self, rhs: Expr) -> Self { self.binary(BinaryOp::Div, rhs) }

  pub fn is_not_null(self) -> Self { Self::IsNotNull(Box::new(self)) }

  pub fn ceil(self) -> Self { Self::Ceil(Box::new(self)) }

  pub fn to_real(self) -> Self { Self::ToReal(Box::new(self)) }

  pub fn sum(self) -> Self {
    Self::Aggregate { func: AggregateFn::Sum, arg: Box::new(self) }
  }

  pub fn avg(self) -> Self {
    Self::Aggregate { func: AggregateFn::Avg, arg: Box::new(self) }
  }
}

// ─── Select ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum SelectColumn {
  /// Carry every column of the source through unchanged.
  Star,
  Expr { expr: Expr, alias: String },
}

impl SelectColumn {
  pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
    Self::Expr { expr, alias: alias.into() }
  }
}

#[derive(Debug, Clone)]
pub enum Source {
  Table { name: String },
  Subquery { select: Box<Select>, alias: String },
}

/// An inner join against another table.
#[derive(Debug, Clone)]
pub struct Join {
  pub table: String,
  pub alias: Option<String>,
  pub on:    Expr,
}

#[derive(Debug, Clone)]
pub struct Select {
  pub columns:  Vec<SelectColumn>,
  pub from:     Source,
  pub joins:    Vec<Join>,
  pub filter:   Option<Expr>,
  pub group_by: Vec<Expr>,
}

impl Select {
  /// Render to SQL text plus the bound parameters, in placeholder order.
  pub fn render(&self) -> Sql {
    let mut r = Renderer::default();
    r.select(self);
    Sql { text: r.text, params: r.params }
  }
}

/// A rendered query: text with `?` placeholders and the values to bind.
#[derive(Debug, Clone)]
pub struct Sql {
  pub text:   String,
  pub params: Vec<Value>,
}

// ─── Rendering ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Renderer {
  text:   String,
  params: Vec<Value>,
}

impl Renderer {
  fn push(&mut self, s: &str) { self.text.push_str(s) }

  /// Double-quoted identifier; aliases contain `/` so quoting is mandatory.
  fn ident(&mut self, name: &str) {
    self.text.push('"');
    self.text.push_str(&name.replace('"', "\"\""));
    self.text.push('"');
  }

  fn param(&mut self, value: Value) {
    self.text.push('?');
    self.params.push(value);
  }

  fn select(&mut self, select: &Select) {
    self.push("SELECT ");
    for (i, column) in select.columns.iter().enumerate() {
      if i > 0 {
        self.push(", ");
      }
      match column {
        SelectColumn::Star => self.push("*"),
        SelectColumn::Expr { expr, alias } => {
          self.expr(expr);
          self.push(" AS ");
          self.ident(alias);
        }
      }
    }
    self.push(" FROM ");
    match &select.from {
      Source::Table { name } => self.ident(name),
      Source::Subquery { select: inner, alias } => {
        self.push("(");
        self.select(inner);
        self.push(") AS ");
        self.ident(alias);
      }
    }
    for join in &select.joins {
      self.push(" JOIN ");
      self.ident(&join.table);
      if let Some(alias) = &join.alias {
        self.push(" AS ");
        self.ident(alias);
      }
      self.push(" ON ");
      self.expr(&join.on);
    }
    if let Some(filter) = &select.filter {
      self.push(" WHERE ");
      self.expr(filter);
    }
    for (i, expr) in select.group_by.iter().enumerate() {
      self.push(if i == 0 { " GROUP BY " } else { ", " });
      self.expr(expr);
    }
  }

  fn expr(&mut self, expr: &Expr) {
    match expr {
      Expr::Column { table, name } => {
        if let Some(table) = table {
          self.ident(table);
          self.push(".");
        }
        self.ident(name);
      }
      Expr::Literal(value) => self.param(value.clone()),
      Expr::Tag(key) => {
        self.push("json_extract(");
        self.ident("tags");
        self.push(", ");
        self.param(Value::Text(format!("$.\"{key}\"")));
        self.push(")");
      }
      Expr::Binary { op, lhs, rhs } => {
        self.push("(");
        self.expr(lhs);
        self.push(" ");
        self.push(op.sql());
        self.push(" ");
        self.expr(rhs);
        self.push(")");
      }
      Expr::And(parts) => self.variadic("AND", parts),
      Expr::Or(parts) => self.variadic("OR", parts),
      Expr::IsNotNull(inner) => {
        self.push("(");
        self.expr(inner);
        self.push(" IS NOT NULL)");
      }
      Expr::In { expr, values } => {
        self.push("(");
        self.expr(expr);
        self.push(" IN (");
        for (i, value) in values.iter().enumerate() {
          if i > 0 {
            self.push(", ");
          }
          self.param(value.clone());
        }
        self.push("))");
      }
      Expr::Case { whens, otherwise } => {
        self.push("CASE");
        for (condition, result) in whens {
          self.push(" WHEN ");
          self.expr(condition);
          self.push(" THEN ");
          self.expr(result);
        }
        if let Some(otherwise) = otherwise {
          self.push(" ELSE ");
          self.expr(otherwise);
        }
        self.push(" END");
      }
      Expr::Coalesce(parts) => {
        self.push("coalesce(");
        for (i, part) in parts.iter().enumerate() {
          if i > 0 {
            self.push(", ");
          }
          self.expr(part);
        }
        self.push(")");
      }
      Expr::Ceil(inner) => {
        // (CAST(x AS INTEGER) + (x > CAST(x AS INTEGER)))
        // NULL propagates; exact integers are unchanged.
        self.push("(CAST(");
        self.expr(inner);
        self.push(" AS INTEGER) + (");
        self.expr(inner);
        self.push(" > CAST(");
        self.expr(inner);
        self.push(" AS INTEGER)))");
      }
      Expr::ToReal(inner) => {
        self.push("CAST(");
        self.expr(inner);
        self.push(" AS REAL)");
      }
      Expr::Aggregate { func, arg } => {
        self.push(func.sql());
        self.push("(");
        self.expr(arg);
        self.push(")");
      }
      Expr::CountAll => self.push("count(*)"),
      Expr::CountIf(predicate) => {
        self.push("count(CASE WHEN ");
        self.expr(predicate);
        self.push(" THEN 1 END)");
      }
    }
  }

  fn variadic(&mut self, op: &str, parts: &[Expr]) {
    self.push("(");
    for (i, part) in parts.iter().enumerate() {
      if i > 0 {
        self.push(" ");
        self.push(op);
        self.push(" ");
      }
      self.expr(part);
    }
    self.push(")");
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
