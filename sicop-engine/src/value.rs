//! Scalar value helpers for dynamic rows
//!
//! Uploaded values arrive as JSON scalars whose textual form varies by
//! source file ("1500", 1500, "  1500.50  "). These helpers define the
//! one interpretation the whole engine uses.

use serde_json::Value;
use std::cmp::Ordering;

/// Parse a scalar as a float. Non-numeric strings yield `None` so
/// aggregation can exclude them instead of treating them as zero.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Stringify a scalar for grouping keys and comparisons. Strings come
/// back verbatim (no added quotes); null becomes the literal "null".
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Ordering used by consolidation sorting: numeric when both sides
/// parse as numbers, lexicographic otherwise.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => display(a).cmp(&display(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_parses_numbers_and_numeric_strings() {
        assert_eq!(numeric(&json!(10)), Some(10.0));
        assert_eq!(numeric(&json!("20.5")), Some(20.5));
        assert_eq!(numeric(&json!("  7 ")), Some(7.0));
    }

    #[test]
    fn numeric_rejects_non_numeric() {
        assert_eq!(numeric(&json!("abc")), None);
        assert_eq!(numeric(&json!(true)), None);
        assert_eq!(numeric(&Value::Null), None);
    }

    #[test]
    fn display_is_unquoted_for_strings() {
        assert_eq!(display(&json!("abc")), "abc");
        assert_eq!(display(&json!(3)), "3");
        assert_eq!(display(&Value::Null), "null");
    }

    #[test]
    fn compare_prefers_numeric_order() {
        assert_eq!(compare(&json!("9"), &json!("10")), Ordering::Less);
        assert_eq!(compare(&json!("b"), &json!("a")), Ordering::Greater);
    }
}
