//! Condition compilation.
//!
//! A [`ConditionSpec`] is an ordered list of `column => Condition` pairs. It
//! compiles to a clause with `?` placeholders and the values bound to them,
//! in the same left-to-right order. Values never end up in the SQL text.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::value::Value;

/// Comparison operators accepted by [`Condition::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Like,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "!=" => Ok(CompareOp::NotEqual),
            "<" => Ok(CompareOp::Less),
            "<=" => Ok(CompareOp::LessOrEqual),
            ">" => Ok(CompareOp::Greater),
            ">=" => Ok(CompareOp::GreaterOrEqual),
            s if s.eq_ignore_ascii_case("LIKE") => Ok(CompareOp::Like),
            other => Err(Error::UnsupportedOperator(other.to_string())),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// What a single column must satisfy, or be set to.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equal(Value),
    Compare(CompareOp, Value),
    InSet(Vec<Value>),
    /// Raw SQL placed on the right of `=`, with its own `?` placeholders.
    /// The caller vouches for the fragment.
    Expression { sql: String, params: Vec<Value> },
}

impl Condition {
    pub fn equal(value: impl Into<Value>) -> Self {
        Condition::Equal(value.into())
    }

    /// Build a comparison from an operator string, rejecting anything
    /// outside the allow-list.
    pub fn compare(op: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Condition::Compare(op.parse()?, value.into()))
    }

    pub fn in_set<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::InSet(values.into_iter().map(Into::into).collect())
    }

    pub fn expression(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Condition::Expression {
            sql: sql.into(),
            params,
        }
    }
}

/// Ordered `column => Condition` mapping.
///
/// Setting a column twice replaces its condition but keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSpec {
    entries: Vec<(String, Condition)>,
}

impl ConditionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, condition: Condition) {
        let column = column.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = condition,
            None => self.entries.push((column, condition)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.insert(column, condition);
        self
    }

    pub fn equal(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Condition::equal(value))
    }

    pub fn compare(
        self,
        column: impl Into<String>,
        op: &str,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let condition = Condition::compare(op, value)?;
        Ok(self.with(column, condition))
    }

    pub fn in_set<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with(column, Condition::in_set(values))
    }

    pub fn expression(
        self,
        column: impl Into<String>,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        self.with(column, Condition::expression(sql, params))
    }

    pub fn get(&self, column: &str) -> Option<&Condition> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, condition)| condition)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.entries.iter().map(|(c, condition)| (c.as_str(), condition))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ConditionSpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |spec, (column, value)| spec.equal(column, value))
    }
}

/// Separator placed between compiled fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    /// `, ` for SET lists. Only assignments are allowed.
    Comma,
    And,
    Or,
}

impl Joiner {
    pub fn as_str(self) -> &'static str {
        match self {
            Joiner::Comma => ", ",
            Joiner::And => " AND ",
            Joiner::Or => " OR ",
        }
    }
}

/// Clause text plus the values for its placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledClause {
    pub text: String,
    pub params: Vec<Value>,
}

impl CompiledClause {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Pieces of a column-list `INSERT`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuesClause {
    /// Quoted column list, comma separated.
    pub columns: String,
    /// One slot per column: `?` or an expression.
    pub values: String,
    pub params: Vec<Value>,
}

/// Compile a [`ConditionSpec`] into a clause joined by `joiner`.
///
/// Entries are emitted in insertion order. An empty `InSet` compiles to `1 = 0`,
/// which matches nothing. Nothing is returned on error.
pub fn compile(spec: &ConditionSpec, joiner: Joiner) -> Result<CompiledClause> {
    let mut fragments = Vec::with_capacity(spec.len());
    let mut params = Vec::new();

    for (column, condition) in spec.iter() {
        let ident = quote_ident(column)?;
        match condition {
            Condition::Equal(value) => {
                fragments.push(format!("{ident} = ?"));
                params.push(value.clone());
            }
            Condition::Compare(op, value) => {
                if joiner == Joiner::Comma {
                    return Err(Error::malformed(column, "a comparison cannot be assigned"));
                }
                fragments.push(format!("{ident} {op} ?"));
                params.push(value.clone());
            }
            Condition::InSet(values) => {
                if joiner == Joiner::Comma {
                    return Err(Error::malformed(column, "a set cannot be assigned"));
                }
                if values.is_empty() {
                    fragments.push("1 = 0".to_string());
                } else {
                    let slots = vec!["?"; values.len()].join(", ");
                    fragments.push(format!("{ident} IN ({slots})"));
                    params.extend(values.iter().cloned());
                }
            }
            Condition::Expression { sql, params: bound } => {
                check_expression(column, sql, bound)?;
                fragments.push(format!("{ident} = {sql}"));
                params.extend(bound.iter().cloned());
            }
        }
    }

    Ok(CompiledClause {
        text: fragments.join(joiner.as_str()),
        params,
    })
}

/// Compile a [`ConditionSpec`] into the column list and value slots of an `INSERT`.
pub fn compile_values(spec: &ConditionSpec) -> Result<ValuesClause> {
    let mut columns = Vec::with_capacity(spec.len());
    let mut slots = Vec::with_capacity(spec.len());
    let mut params = Vec::new();

    for (column, condition) in spec.iter() {
        columns.push(quote_ident(column)?);
        match condition {
            Condition::Equal(value) => {
                slots.push("?".to_string());
                params.push(value.clone());
            }
            Condition::Expression { sql, params: bound } => {
                check_expression(column, sql, bound)?;
                slots.push(sql.clone());
                params.extend(bound.iter().cloned());
            }
            Condition::Compare(..) | Condition::InSet(_) => {
                return Err(Error::malformed(
                    column,
                    "only values or expressions can be inserted",
                ));
            }
        }
    }

    Ok(ValuesClause {
        columns: columns.join(", "),
        values: slots.join(", "),
        params,
    })
}

/// Backtick-quote an identifier.
pub(crate) fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::malformed(name, "empty identifier"));
    }
    if name.contains(['`', '\0']) {
        return Err(Error::malformed(name, "identifier contains a backtick or NUL"));
    }
    Ok(format!("`{name}`"))
}

fn check_expression(column: &str, sql: &str, params: &[Value]) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(Error::malformed(column, "empty expression"));
    }
    let slots = count_placeholders(sql);
    if slots != params.len() {
        return Err(Error::malformed(
            column,
            format!(
                "expression has {slots} placeholders but {} params",
                params.len()
            ),
        ));
    }
    Ok(())
}

/// Count `?` placeholders outside quoted literals and identifiers.
pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut count = 0;
    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '?') => count += 1,
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_params_follow_spec_order() {
        let spec = ConditionSpec::new()
            .equal("zeta", 1)
            .equal("alpha", "two")
            .equal("mid", 3.5);
        let clause = compile(&spec, Joiner::And).unwrap();
        assert_eq!(clause.text, "`zeta` = ? AND `alpha` = ? AND `mid` = ?");
        assert_eq!(
            clause.params,
            vec![Value::Integer(1), Value::from("two"), Value::Real(3.5)]
        );
    }

    #[test]
    fn set_clause_uses_comma() {
        let spec: ConditionSpec = [("type", 1), ("active", 0)].into_iter().collect();
        let clause = compile(&spec, Joiner::Comma).unwrap();
        assert_eq!(clause.text, "`type` = ?, `active` = ?");
    }

    #[test]
    fn comparisons() {
        let spec = ConditionSpec::new()
            .compare("time", ">=", 100)
            .unwrap()
            .compare("email", "like", "%@b.com")
            .unwrap()
            .compare("password", "!=", "")
            .unwrap();
        let clause = compile(&spec, Joiner::And).unwrap();
        assert_eq!(
            clause.text,
            "`time` >= ? AND `email` LIKE ? AND `password` != ?"
        );
        assert_eq!(clause.params.len(), 3);
    }

    #[test]
    fn unsupported_operator_is_rejected_without_touching_the_spec() {
        let spec = ConditionSpec::new().equal("user_id", 1);
        for op in ["=", "<>", "IN", "BETWEEN", "; DROP TABLE user"] {
            let err = spec.clone().compare("age", op, 1).unwrap_err();
            assert!(matches!(err, Error::UnsupportedOperator(ref o) if o == op));
        }
        let clause = compile(&spec, Joiner::And).unwrap();
        assert_eq!(clause.text, "`user_id` = ?");
        assert_eq!(clause.params, vec![Value::Integer(1)]);
    }

    #[test]
    fn in_set_expands_one_placeholder_per_value() {
        let spec = ConditionSpec::new()
            .equal("active", 1)
            .in_set("user_id", [3, 7, 9]);
        let clause = compile(&spec, Joiner::And).unwrap();
        assert_eq!(clause.text, "`active` = ? AND `user_id` IN (?, ?, ?)");
        assert_eq!(clause.params, crate::values![1, 3, 7, 9]);
    }

    #[test]
    fn empty_in_set_matches_nothing() {
        let spec = ConditionSpec::new().in_set("user_id", Vec::<i64>::new());
        let clause = compile(&spec, Joiner::And).unwrap();
        assert_eq!(clause.text, "1 = 0");
        assert!(clause.params.is_empty());

        let either = ConditionSpec::new()
            .in_set("user_id", Vec::<i64>::new())
            .equal("email", "a@b.com");
        let clause = compile(&either, Joiner::Or).unwrap();
        assert_eq!(clause.text, "1 = 0 OR `email` = ?");
    }

    #[test]
    fn expression_is_merged_verbatim() {
        let spec = ConditionSpec::new()
            .equal("a", 1)
            .expression("counter", "`counter` + ?", crate::values![5])
            .equal("b", 2);
        let clause = compile(&spec, Joiner::Comma).unwrap();
        assert_eq!(clause.text, "`a` = ?, `counter` = `counter` + ?, `b` = ?");
        assert_eq!(clause.params, crate::values![1, 5, 2]);
    }

    #[test]
    fn expression_placeholder_mismatch_is_malformed() {
        let spec = ConditionSpec::new().expression("x", "COALESCE(?, ?)", crate::values![1]);
        assert!(matches!(
            compile(&spec, Joiner::And),
            Err(Error::MalformedCondition { ref column, .. }) if column == "x"
        ));

        // placeholders inside literals do not count
        let spec = ConditionSpec::new().expression("x", "REPLACE(?, '?', '')", crate::values!["a"]);
        assert!(compile(&spec, Joiner::And).is_ok());
    }

    #[test]
    fn comparisons_cannot_be_assigned() {
        let spec = ConditionSpec::new().compare("age", ">", 1).unwrap();
        assert!(matches!(
            compile(&spec, Joiner::Comma),
            Err(Error::MalformedCondition { .. })
        ));
        let spec = ConditionSpec::new().in_set("age", [1]);
        assert!(compile(&spec, Joiner::Comma).is_err());
    }

    #[test]
    fn bad_identifiers_are_malformed() {
        for column in ["", "evil` = 1 --", "nul\0"] {
            let spec = ConditionSpec::new().equal(column, 1);
            assert!(matches!(
                compile(&spec, Joiner::And),
                Err(Error::MalformedCondition { .. })
            ));
        }
    }

    #[test]
    fn setting_a_column_twice_keeps_its_position() {
        let spec = ConditionSpec::new().equal("a", 1).equal("b", 2).equal("a", 3);
        assert_eq!(spec.len(), 2);
        let clause = compile(&spec, Joiner::And).unwrap();
        assert_eq!(clause.text, "`a` = ? AND `b` = ?");
        assert_eq!(clause.params, crate::values![3, 2]);
    }

    #[test]
    fn placeholder_count_matches_params() {
        let spec = ConditionSpec::new()
            .equal("a", 1)
            .in_set("b", ["x", "y"])
            .compare("c", "<", 4)
            .unwrap()
            .expression("d", "MAX(?, ?)", crate::values![5, 6]);
        let clause = compile(&spec, Joiner::And).unwrap();
        assert_eq!(count_placeholders(&clause.text), clause.params.len());
    }

    #[test]
    fn values_clause_for_inserts() {
        let spec = ConditionSpec::new()
            .equal("email", "a@b.com")
            .expression("created", "strftime('%s', 'now')", vec![])
            .equal("type", 0);
        let values = compile_values(&spec).unwrap();
        assert_eq!(values.columns, "`email`, `created`, `type`");
        assert_eq!(values.values, "?, strftime('%s', 'now'), ?");
        assert_eq!(values.params, crate::values!["a@b.com", 0]);

        let bad = ConditionSpec::new().in_set("email", ["a"]);
        assert!(compile_values(&bad).is_err());
    }
}
