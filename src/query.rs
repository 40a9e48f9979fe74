//! Statement rendering for the CRUD operations.
//!
//! Each operation renders to a [`Statement`]: SQL text plus the values for
//! its placeholders, ready for the executor. Rendering never touches the
//! connection.

use std::fmt;

use crate::condition::{compile, compile_values, quote_ident, ConditionSpec, Joiner};
use crate::error::{Error, Result};
use crate::value::Value;

/// Rendered SQL and its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quote a possibly schema-qualified name, part by part.
fn quote_qualified(name: &str) -> Result<String> {
    name.split('.')
        .map(quote_ident)
        .collect::<Result<Vec<_>>>()
        .map(|parts| parts.join("."))
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Column(String),
    /// Computed value read back under `alias`.
    Expression { expr: String, alias: String },
}

impl Field {
    pub fn column(name: impl Into<String>) -> Self {
        Field::Column(name.into())
    }

    pub fn expr(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Field::Expression {
            expr: expr.into(),
            alias: alias.into(),
        }
    }

    /// Name of the result column this field produces.
    pub fn key(&self) -> &str {
        match self {
            Field::Column(name) => name.rsplit('.').next().unwrap_or(name),
            Field::Expression { alias, .. } => alias,
        }
    }

    fn to_sql(&self) -> Result<String> {
        match self {
            Field::Column(name) => quote_qualified(name),
            Field::Expression { expr, alias } => Ok(format!("{expr} AS {}", quote_ident(alias)?)),
        }
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::column(name)
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::Column(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    /// Raw `ON ...` or `USING (...)` text.
    pub constraint: String,
}

/// The `FROM` target of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub joins: Vec<Join>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joins: Vec::new(),
        }
    }

    pub fn join(
        mut self,
        kind: JoinKind,
        table: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            constraint: constraint.into(),
        });
        self
    }

    fn to_sql(&self) -> Result<String> {
        let mut sql = quote_qualified(&self.name)?;
        for join in &self.joins {
            sql.push_str(&format!(
                " {} {} {}",
                join.kind,
                quote_qualified(&join.table)?,
                join.constraint.trim()
            ));
        }
        Ok(sql)
    }
}

impl From<&str> for Table {
    fn from(name: &str) -> Self {
        Table::new(name)
    }
}

impl From<String> for Table {
    fn from(name: String) -> Self {
        Table::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub count: u64,
    pub offset: Option<u64>,
}

/// What an insert does when it hits a uniqueness conflict.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OnConflict {
    /// Plain insert; the conflict is an error.
    #[default]
    Fail,
    /// Skip the row.
    Ignore,
    /// Upsert: apply these assignments to the existing row.
    Update(ConditionSpec),
}

/// A `SELECT`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: Table,
    pub conditions: ConditionSpec,
    /// Empty means `*`.
    pub fields: Vec<Field>,
    /// Raw SQL appended after the `WHERE` clause (`GROUP BY ...`, `ORDER BY ...`).
    pub trailing: String,
    /// `(field, ascending)` pairs, applied after any trailing SQL.
    pub order_by: Vec<(String, bool)>,
    pub limit: Option<Limit>,
}

impl ReadOperation {
    pub fn new(table: impl Into<Table>) -> Self {
        Self {
            table: table.into(),
            conditions: ConditionSpec::new(),
            fields: Vec::new(),
            trailing: String::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn conditions(mut self, conditions: ConditionSpec) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn trailing(mut self, sql: impl Into<String>) -> Self {
        self.trailing = sql.into();
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((field.into(), ascending));
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(Limit { count, offset: None });
        self
    }

    pub fn page(mut self, count: u64, offset: u64) -> Self {
        self.limit = Some(Limit {
            count,
            offset: Some(offset),
        });
        self
    }

    pub fn to_statement(&self) -> Result<Statement> {
        let fields = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields
                .iter()
                .map(Field::to_sql)
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let mut sql = format!("SELECT {fields} FROM {}", self.table.to_sql()?);
        let clause = compile(&self.conditions, Joiner::And)?;
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause.text);
        }

        let trailing = self.trailing.trim();
        if !trailing.is_empty() {
            sql.push(' ');
            sql.push_str(trailing);
        }

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(field, asc)| {
                    quote_qualified(field).map(|f| format!("{f} {}", if *asc { "ASC" } else { "DESC" }))
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit.count));
            if let Some(offset) = limit.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        Ok(Statement {
            sql,
            params: clause.params,
        })
    }
}

/// An `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub data: ConditionSpec,
    pub on_conflict: OnConflict,
}

impl CreateOperation {
    /// Column an upsert returns the written row's id under.
    pub const UPSERT_ID: &'static str = "upserted_id";

    pub fn to_statement(&self) -> Result<Statement> {
        if self.data.is_empty() {
            return Err(Error::malformed(&self.table, "nothing to insert"));
        }
        let values = compile_values(&self.data)?;
        let verb = match self.on_conflict {
            OnConflict::Ignore => "INSERT OR IGNORE INTO",
            OnConflict::Fail | OnConflict::Update(_) => "INSERT INTO",
        };
        let mut sql = format!(
            "{verb} {} ({}) VALUES ({})",
            quote_qualified(&self.table)?,
            values.columns,
            values.values
        );
        let mut params = values.params;

        if let OnConflict::Update(assignments) = &self.on_conflict {
            let set = compile(assignments, Joiner::Comma)?;
            if set.is_empty() {
                return Err(Error::malformed(&self.table, "empty conflict update"));
            }
            sql.push_str(" ON CONFLICT DO UPDATE SET ");
            sql.push_str(&set.text);
            // last_insert_rowid is left alone when the update path runs
            sql.push_str(&format!(" RETURNING rowid AS `{}`", Self::UPSERT_ID));
            params.extend(set.params);
        }

        Ok(Statement { sql, params })
    }
}

/// An `UPDATE`. Both the assignments and the conditions must be non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub data: ConditionSpec,
    pub conditions: ConditionSpec,
}

impl UpdateOperation {
    pub fn to_statement(&self) -> Result<Statement> {
        if self.data.is_empty() {
            return Err(Error::malformed(&self.table, "nothing to update"));
        }
        if self.conditions.is_empty() {
            return Err(Error::malformed(&self.table, "update without conditions"));
        }
        let set = compile(&self.data, Joiner::Comma)?;
        let filter = compile(&self.conditions, Joiner::And)?;

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_qualified(&self.table)?,
            set.text,
            filter.text
        );
        let mut params = set.params;
        params.extend(filter.params);
        Ok(Statement { sql, params })
    }
}

/// A `DELETE`. The conditions must be non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub conditions: ConditionSpec,
}

impl DeleteOperation {
    pub fn to_statement(&self) -> Result<Statement> {
        if self.conditions.is_empty() {
            return Err(Error::malformed(&self.table, "delete without conditions"));
        }
        let filter = compile(&self.conditions, Joiner::And)?;
        Ok(Statement {
            sql: format!(
                "DELETE FROM {} WHERE {}",
                quote_qualified(&self.table)?,
                filter.text
            ),
            params: filter.params,
        })
    }
}
