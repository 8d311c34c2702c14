//! Single-field ordering of snapshots.
//!
//! Ordering uses a total order over JSON values so that mixed or missing
//! field values still sort deterministically:
//! `null < bool < number < string < array < object`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::document::{Document, Fields};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Values sort non-decreasing.
    #[default]
    Asc,
    /// Values sort non-increasing.
    Desc,
}

/// Ordering constraint for a collection subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field to sort by. `id` and `lastUpdated` address the envelope.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: Direction,
}

/// Build an [`OrderSpec`]. Pure; exists for call-site readability.
pub fn order_by(field: impl Into<String>, direction: Direction) -> OrderSpec {
    OrderSpec {
        field: field.into(),
        direction,
    }
}

impl OrderSpec {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        order_by(field, Direction::Asc)
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        order_by(field, Direction::Desc)
    }

    /// Compare two documents under this ordering.
    pub fn compare(&self, a: &Document<Fields>, b: &Document<Fields>) -> Ordering {
        let ordering = compare_values(&a.field(&self.field), &b.field(&self.field));
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }

    /// Sort a snapshot in place. The sort is stable: documents with equal
    /// keys keep their relative order from the input.
    pub fn apply(&self, snapshot: &mut Vec<Document<Fields>>) {
        let mut keyed: Vec<(Value, Document<Fields>)> = snapshot
            .drain(..)
            .map(|doc| (doc.field(&self.field), doc))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = compare_values(a, b);
            match self.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            }
        });
        snapshot.extend(keyed.into_iter().map(|(_, doc)| doc));
    }
}

/// Total order over JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        // Canonical text: keys are sorted because maps are BTreeMap-backed.
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document<Fields> {
        let mut fields = Fields::new();
        fields.insert("rank".to_string(), value);
        Document::from_fields(id, Utc::now(), fields)
    }

    fn ids(docs: &[Document<Fields>]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_ascending_numbers() {
        let mut docs = vec![doc("c", json!(3)), doc("a", json!(1)), doc("b", json!(2))];
        OrderSpec::asc("rank").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_descending_numbers() {
        let mut docs = vec![doc("c", json!(3)), doc("a", json!(1)), doc("b", json!(2))];
        OrderSpec::desc("rank").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let mut docs = vec![
            doc("first", json!(5)),
            doc("low", json!(1)),
            doc("second", json!(5)),
            doc("third", json!(5)),
        ];
        OrderSpec::asc("rank").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["low", "first", "second", "third"]);

        let mut docs = vec![doc("first", json!(5)), doc("low", json!(1)), doc("second", json!(5))];
        OrderSpec::desc("rank").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["first", "second", "low"]);
    }

    #[test]
    fn test_mixed_types_follow_rank() {
        let mut docs = vec![
            doc("obj", json!({"k": 1})),
            doc("str", json!("a")),
            doc("null", Value::Null),
            doc("arr", json!([1])),
            doc("num", json!(0.5)),
            doc("bool", json!(true)),
        ];
        OrderSpec::asc("rank").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["null", "bool", "num", "str", "arr", "obj"]);
    }

    #[test]
    fn test_missing_field_sorts_as_null() {
        let missing = Document::from_fields("missing", Utc::now(), Fields::new());
        let mut docs = vec![doc("one", json!(1)), missing];
        OrderSpec::asc("rank").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["missing", "one"]);
    }

    #[test]
    fn test_iso_timestamps_sort_chronologically() {
        let mut docs = vec![
            doc("late", json!("2024-03-01T10:00:00Z")),
            doc("early", json!("2024-01-01T00:00:00Z")),
        ];
        OrderSpec::asc("rank").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["early", "late"]);
    }

    #[test]
    fn test_last_updated_orders_across_precisions() {
        let stamp = |text: &str| {
            chrono::DateTime::parse_from_rfc3339(text)
                .unwrap()
                .with_timezone(&Utc)
        };
        let stored: Document<Fields> = serde_json::from_value(json!({
            "id": "stored",
            "lastUpdated": "2024-01-01T00:00:00.250Z",
        }))
        .unwrap();
        let mut docs = vec![
            Document::from_fields("later", stamp("2024-01-01T00:00:00.500Z"), Fields::new()),
            Document::from_fields("earlier", stamp("2024-01-01T00:00:00Z"), Fields::new()),
            stored,
            Document::from_fields("latest", stamp("2024-01-01T00:00:00.500000001Z"), Fields::new()),
        ];
        OrderSpec::asc("lastUpdated").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["earlier", "stored", "later", "latest"]);

        OrderSpec::desc("lastUpdated").apply(&mut docs);
        assert_eq!(ids(&docs), vec!["latest", "later", "stored", "earlier"]);
    }

    #[test]
    fn test_number_comparison_across_representations() {
        assert_eq!(compare_values(&json!(-1), &json!(u64::MAX)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(2.0)), Ordering::Equal);
    }

    #[test]
    fn test_arrays_compare_lexicographically() {
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 3])), Ordering::Less);
        assert_eq!(compare_values(&json!([1]), &json!([1, 0])), Ordering::Less);
    }

    #[test]
    fn test_order_spec_serde() {
        let spec: OrderSpec = serde_json::from_value(json!({"field": "createdAt", "direction": "desc"})).unwrap();
        assert_eq!(spec, order_by("createdAt", Direction::Desc));
        let spec: OrderSpec = serde_json::from_value(json!({"field": "name"})).unwrap();
        assert_eq!(spec.direction, Direction::Asc);
    }
}
