//! Criteria Expressions
//!
//! Interceptor rows may carry a criteria expression that filters the hook
//! payload. The dispatchers only depend on [`CriteriaEvaluator`]; the
//! built-in [`FieldCriteria`] understands comparisons joined with `&&` and
//! `||`:
//!
//! ```text
//! status = 'paid' && total >= 100 || vip == true
//! ```
//!
//! An array payload is filtered element by element; an object payload is
//! kept or dropped as a whole.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::error::{CoreError, CoreResult};

pub trait CriteriaEvaluator: Send + Sync {
    /// The filtered payload, or `None` when nothing matches
    fn evaluate(&self, criteria: &str, payload: &Value) -> CoreResult<Option<Value>>;
}

/// Comparison-based evaluator over object fields
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldCriteria;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
struct Comparison {
    path: Vec<String>,
    op: Op,
    value: Value,
}

/// Disjunction of conjunctions
type Expr = Vec<Vec<Comparison>>;

fn comparison_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z_][\w.]*)\s*(==|!=|<>|>=|<=|=|>|<)\s*(.+?)\s*$").ok()
        })
        .as_ref()
}

fn invalid(criteria: &str, reason: impl Into<String>) -> CoreError {
    CoreError::Criteria {
        criteria: criteria.to_string(),
        reason: reason.into(),
    }
}

/// Split on `sep` outside quoted literals
fn split_unquoted<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = text.char_indices();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
        } else if text[i..].starts_with(sep) {
            parts.push(&text[start..i]);
            start = i + sep.len();
            // skip the rest of the separator
            for _ in 1..sep.chars().count() {
                chars.next();
            }
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse(criteria: &str) -> CoreResult<Expr> {
    let Some(pattern) = comparison_pattern() else {
        return Err(invalid(criteria, "comparison pattern unavailable"));
    };
    split_unquoted(criteria, "||")
        .into_iter()
        .map(|conjunction| {
            split_unquoted(conjunction, "&&")
                .into_iter()
                .map(|term| {
                    let caps = pattern
                        .captures(term)
                        .ok_or_else(|| invalid(criteria, format!("cannot parse '{}'", term.trim())))?;
                    let op = match &caps[2] {
                        "=" | "==" => Op::Eq,
                        "!=" | "<>" => Op::Ne,
                        ">" => Op::Gt,
                        ">=" => Op::Ge,
                        "<" => Op::Lt,
                        _ => Op::Le,
                    };
                    Ok(Comparison {
                        path: caps[1].split('.').map(str::to_string).collect(),
                        op,
                        value: literal(&caps[3]),
                    })
                })
                .collect()
        })
        .collect()
}

fn literal(text: &str) -> Value {
    let quoted = (text.starts_with('\'') && text.ends_with('\''))
        || (text.starts_with('"') && text.ends_with('"'));
    if quoted && text.len() >= 2 {
        return Value::String(text[1..text.len() - 1].to_string());
    }
    match text {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => text
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| text.parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

fn lookup<'v>(item: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(item, |v, key| v.get(key))
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (number(left), number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        },
    }
}

impl Comparison {
    fn holds(&self, item: &Value) -> bool {
        let left = lookup(item, &self.path).unwrap_or(&Value::Null);
        let ordering = compare(left, &self.value);
        match self.op {
            Op::Eq => ordering == Some(Ordering::Equal),
            Op::Ne => ordering != Some(Ordering::Equal),
            Op::Gt => ordering == Some(Ordering::Greater),
            Op::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            Op::Lt => ordering == Some(Ordering::Less),
            Op::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

fn matches(expr: &Expr, item: &Value) -> bool {
    expr.iter().any(|all| all.iter().all(|c| c.holds(item)))
}

impl CriteriaEvaluator for FieldCriteria {
    fn evaluate(&self, criteria: &str, payload: &Value) -> CoreResult<Option<Value>> {
        let expr = parse(criteria)?;
        let filtered = match payload {
            Value::Array(items) => {
                let kept: Vec<Value> = items.iter().filter(|i| matches(&expr, i)).cloned().collect();
                (!kept.is_empty()).then_some(Value::Array(kept))
            }
            Value::Object(_) => matches(&expr, payload).then(|| payload.clone()),
            _ => None,
        };
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filters_array() {
        let rows = json!([
            {"status": "paid", "total": 150},
            {"status": "paid", "total": 20},
            {"status": "open", "total": 500}
        ]);
        let out = FieldCriteria
            .evaluate("status = 'paid' && total >= 100", &rows)
            .unwrap();
        assert_eq!(out, Some(json!([{"status": "paid", "total": 150}])));
    }

    #[test]
    fn test_or_and_nested_paths() {
        let row = json!({"user": {"vip": true}, "total": 1});
        assert!(FieldCriteria
            .evaluate("total > 100 || user.vip == true", &row)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_no_match_is_none() {
        let rows = json!([{"status": "open"}]);
        assert_eq!(FieldCriteria.evaluate("status = 'paid'", &rows).unwrap(), None);
        assert_eq!(FieldCriteria.evaluate("status = 'paid'", &json!([])).unwrap(), None);
        assert_eq!(FieldCriteria.evaluate("a = 1", &Value::Null).unwrap(), None);
    }

    #[test]
    fn test_numeric_strings_compare_as_numbers() {
        let rows = json!([{"qty": "12"}]);
        assert!(FieldCriteria.evaluate("qty > 9", &rows).unwrap().is_some());
    }

    #[test]
    fn test_operators_inside_quotes_are_literal() {
        let rows = json!([{"name": "a||b", "tag": "x&&y"}, {"name": "a"}]);
        let out = FieldCriteria
            .evaluate(r#"name == "a||b" && tag = 'x&&y'"#, &rows)
            .unwrap();
        assert_eq!(out, Some(json!([{"name": "a||b", "tag": "x&&y"}])));
        assert_eq!(
            split_unquoted("a = 'p||q' || b = 2", "||"),
            vec!["a = 'p||q' ", " b = 2"]
        );
    }

    #[test]
    fn test_garbage_is_an_error() {
        let err = FieldCriteria.evaluate("what even", &json!({})).unwrap_err();
        assert!(matches!(err, CoreError::Criteria { .. }));
    }
}
