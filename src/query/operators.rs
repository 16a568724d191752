use crate::catalog::schema::TableSchema;
use crate::catalog::types::Value;
use crate::error::CollectionError;
use crate::query::plan::Expr;

/// An [`Expr`] with column names resolved to indices.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    Eq(usize, Value),
    Ne(usize, Value),
    Lt(usize, Value),
    Lte(usize, Value),
    Gt(usize, Value),
    Gte(usize, Value),
    In(usize, Vec<Value>),
    Between(usize, Value, Value),
    IsNull(usize),
    IsNotNull(usize),
    Like(usize, String),
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
    Not(Box<CompiledExpr>),
}

pub fn compile_expr(expr: &Expr, schema: &TableSchema) -> Result<CompiledExpr, CollectionError> {
    let col = |name: &str| find_col_idx(schema, name);
    Ok(match expr {
        Expr::Eq(c, v) => CompiledExpr::Eq(col(c)?, v.clone()),
        Expr::Ne(c, v) => CompiledExpr::Ne(col(c)?, v.clone()),
        Expr::Lt(c, v) => CompiledExpr::Lt(col(c)?, v.clone()),
        Expr::Lte(c, v) => CompiledExpr::Lte(col(c)?, v.clone()),
        Expr::Gt(c, v) => CompiledExpr::Gt(col(c)?, v.clone()),
        Expr::Gte(c, v) => CompiledExpr::Gte(col(c)?, v.clone()),
        Expr::In(c, values) => CompiledExpr::In(col(c)?, values.clone()),
        Expr::Between(c, lo, hi) => CompiledExpr::Between(col(c)?, lo.clone(), hi.clone()),
        Expr::IsNull(c) => CompiledExpr::IsNull(col(c)?),
        Expr::IsNotNull(c) => CompiledExpr::IsNotNull(col(c)?),
        Expr::Like(c, pattern) => CompiledExpr::Like(col(c)?, pattern.clone()),
        Expr::And(a, b) => CompiledExpr::And(
            Box::new(compile_expr(a, schema)?),
            Box::new(compile_expr(b, schema)?),
        ),
        Expr::Or(a, b) => CompiledExpr::Or(
            Box::new(compile_expr(a, schema)?),
            Box::new(compile_expr(b, schema)?),
        ),
        Expr::Not(inner) => CompiledExpr::Not(Box::new(compile_expr(inner, schema)?)),
    })
}

fn get_col(values: &[Value], idx: usize) -> Option<&Value> {
    values.get(idx)
}

pub fn eval_compiled_expr(expr: &CompiledExpr, values: &[Value]) -> bool {
    match expr {
        CompiledExpr::Eq(idx, v) => get_col(values, *idx)
            .is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_eq())),
        CompiledExpr::Ne(idx, v) => get_col(values, *idx)
            .is_some_and(|rv| compare_values(rv, v).is_some_and(|o| !o.is_eq())),
        CompiledExpr::Lt(idx, v) => get_col(values, *idx)
            .is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_lt())),
        CompiledExpr::Lte(idx, v) => get_col(values, *idx)
            .is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_le())),
        CompiledExpr::Gt(idx, v) => get_col(values, *idx)
            .is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_gt())),
        CompiledExpr::Gte(idx, v) => get_col(values, *idx)
            .is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_ge())),
        CompiledExpr::In(idx, candidates) => get_col(values, *idx).is_some_and(|rv| {
            candidates
                .iter()
                .any(|v| compare_values(rv, v).is_some_and(|o| o.is_eq()))
        }),
        CompiledExpr::Between(idx, lo, hi) => get_col(values, *idx).is_some_and(|rv| {
            compare_values(rv, lo).is_some_and(|o| o.is_ge())
                && compare_values(rv, hi).is_some_and(|o| o.is_le())
        }),
        CompiledExpr::IsNull(idx) => get_col(values, *idx).is_some_and(Value::is_null),
        CompiledExpr::IsNotNull(idx) => get_col(values, *idx).is_some_and(|rv| !rv.is_null()),
        CompiledExpr::Like(idx, pattern) => get_col(values, *idx).is_some_and(|rv| match rv {
            Value::String(s) => like_match(s, pattern),
            _ => false,
        }),
        CompiledExpr::And(a, b) => eval_compiled_expr(a, values) && eval_compiled_expr(b, values),
        CompiledExpr::Or(a, b) => eval_compiled_expr(a, values) || eval_compiled_expr(b, values),
        CompiledExpr::Not(inner) => !eval_compiled_expr(inner, values),
    }
}

fn find_col_idx(schema: &TableSchema, col: &str) -> Result<usize, CollectionError> {
    schema
        .column_index(col)
        .ok_or_else(|| CollectionError::ColumnNotFound {
            table: schema.table_name.clone(),
            column: col.to_string(),
        })
}

/// SQL-style `LIKE`: `%` matches any run, `_` matches one byte.
fn like_match(value: &str, pattern: &str) -> bool {
    let text = value.as_bytes();
    let pat = pattern.as_bytes();
    let mut ti = 0usize;
    let mut pi = 0usize;
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < text.len() {
        if pi < pat.len() && (pat[pi] == b'_' || pat[pi] == text[ti]) {
            ti += 1;
            pi += 1;
            continue;
        }
        if pi < pat.len() && pat[pi] == b'%' {
            star_pi = Some(pi);
            pi += 1;
            star_ti = ti;
            continue;
        }
        if let Some(saved_pi) = star_pi {
            pi = saved_pi + 1;
            star_ti += 1;
            ti = star_ti;
            continue;
        }
        return false;
    }

    while pi < pat.len() && pat[pi] == b'%' {
        pi += 1;
    }

    pi == pat.len()
}

/// Comparison used by predicates and searches. Null never compares, so an
/// equality search for a value can never match a null cell.
pub fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(&f64::from(*b)),
        (Value::Float(a), Value::Int(b)) => f64::from(*a).partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Double(b)) => f64::from(*a).partial_cmp(b),
        (Value::Double(a), Value::Float(b)) => a.partial_cmp(&f64::from(*b)),
        _ if left.value_type() != right.value_type() => None,
        _ => Some(left.cmp(right)),
    }
}
