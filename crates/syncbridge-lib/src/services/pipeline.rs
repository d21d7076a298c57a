// Data Pipeline
// Extraction, filtering and transformation over arbitrary JSON values.
// Public entry points never fail: on any internal error they log and
// return the input unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::models::pipeline::{
    FilterCondition, FilterOperator, FilterSpec, TransformOperation, TransformSpec,
};

#[allow(clippy::expect_used)]
static TEMPLATE_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\[\]-]+)\s*\}\}").expect("template placeholder pattern")
});

#[derive(Error, Debug, PartialEq)]
pub enum PipelineError {
    #[error("operator {operator:?} cannot compare against {value}")]
    IncomparableValue { operator: FilterOperator, value: Value },

    #[error("field '{field}' is not numeric")]
    NotNumeric { field: String },

    #[error("field '{field}' is not a recognizable date")]
    InvalidDate { field: String },

    #[error("field '{field}' is not a string")]
    NotAString { field: String },

    #[error("multiplying field '{field}' produced a non-finite number")]
    NonFinite { field: String },
}

type PipelineResult<T> = Result<T, PipelineError>;

// ============================================================================
// Extract
// ============================================================================

/// One step of a parsed path
#[derive(Debug, PartialEq)]
enum PathStep<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<PathStep<'_>>> {
    let mut steps = Vec::new();
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        let (name, mut rest) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !name.is_empty() {
            steps.push(PathStep::Key(name));
        }
        while !rest.is_empty() {
            let close = rest.find(']')?;
            if !rest.starts_with('[') {
                return None;
            }
            let index = rest[1..close].trim().parse::<usize>().ok()?;
            steps.push(PathStep::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Some(steps)
}

fn step_into<'v>(value: &'v Value, step: &PathStep<'_>) -> Option<&'v Value> {
    match (step, value) {
        (PathStep::Key(key), Value::Object(map)) => map.get(*key),
        (PathStep::Key(key), Value::Array(items)) => {
            key.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        (PathStep::Index(i), Value::Array(items)) => items.get(*i),
        _ => None,
    }
}

/// Borrowing variant of [`extract`]
pub fn extract_ref<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let steps = parse_path(path)?;
    let mut current = value;
    for step in &steps {
        current = step_into(current, step)?;
    }
    Some(current)
}

/// Walk a dotted path such as `data.items[0].title`.
/// Returns `None` when any intermediate is missing or the path is malformed.
pub fn extract(value: &Value, path: &str) -> Option<Value> {
    extract_ref(value, path).cloned()
}

fn extract_mut<'v>(value: &'v mut Value, path: &str) -> Option<&'v mut Value> {
    let steps = parse_path(path)?;
    let mut current = value;
    for step in &steps {
        current = match (step, current) {
            (PathStep::Key(key), Value::Object(map)) => map.get_mut(*key)?,
            (PathStep::Key(key), Value::Array(items)) => {
                items.get_mut(key.parse::<usize>().ok()?)?
            }
            (PathStep::Index(i), Value::Array(items)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

// ============================================================================
// Filter
// ============================================================================

/// Apply a filter spec: `limit`, then `filterBy`, then `fields`
pub fn filter(value: &Value, spec: &FilterSpec) -> Value {
    match try_filter(value, spec) {
        Ok(filtered) => filtered,
        Err(e) => {
            log::warn!("[pipeline] Filter failed, passing input through: {}", e);
            value.clone()
        }
    }
}

fn try_filter(value: &Value, spec: &FilterSpec) -> PipelineResult<Value> {
    let mut result = value.clone();

    if let Value::Array(items) = &mut result {
        if let Some(limit) = spec.limit {
            items.truncate(limit);
        }
        if let Some(condition) = &spec.filter_by {
            let mut kept = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                if matches_condition(&item, condition)? {
                    kept.push(item);
                }
            }
            *items = kept;
        }
    }

    if let Some(fields) = &spec.fields {
        result = match result {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| project_fields(item, fields))
                    .collect(),
            ),
            other => project_fields(other, fields),
        };
    }

    Ok(result)
}

fn project_fields(value: Value, fields: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| fields.iter().any(|f| f == key))
                .collect(),
        ),
        other => other,
    }
}

fn matches_condition(item: &Value, condition: &FilterCondition) -> PipelineResult<bool> {
    let field = extract_ref(item, &condition.field);
    let expected = &condition.value;

    match condition.operator {
        FilterOperator::Equals => Ok(field.map(|v| values_equal(v, expected)).unwrap_or(false)),
        FilterOperator::Contains => Ok(match field {
            Some(Value::String(s)) => match expected {
                Value::String(needle) => s.contains(needle.as_str()),
                other => s.contains(&scalar_to_string(other)),
            },
            Some(Value::Array(items)) => items.iter().any(|v| values_equal(v, expected)),
            _ => false,
        }),
        FilterOperator::GreaterThan | FilterOperator::LessThan => {
            if !matches!(expected, Value::Number(_) | Value::String(_)) {
                return Err(PipelineError::IncomparableValue {
                    operator: condition.operator,
                    value: expected.clone(),
                });
            }
            let ordering = match field {
                Some(actual) => compare_values(actual, expected),
                None => None,
            };
            Ok(match ordering {
                Some(ord) if condition.operator == FilterOperator::GreaterThan => {
                    ord == std::cmp::Ordering::Greater
                }
                Some(ord) => ord == std::cmp::Ordering::Less,
                None => false,
            })
        }
        FilterOperator::NotEmpty => Ok(match field {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }),
    }
}

/// Strict equality, except that numbers compare by value (`1 == 1.0`)
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::Number(y)) => x.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.trim().parse::<f64>().ok()?),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Apply a transform spec: key renames first, then value transforms
pub fn transform(value: &Value, spec: &TransformSpec) -> Value {
    match try_transform(value, spec) {
        Ok(transformed) => transformed,
        Err(e) => {
            log::warn!("[pipeline] Transform failed, passing input through: {}", e);
            value.clone()
        }
    }
}

fn try_transform(value: &Value, spec: &TransformSpec) -> PipelineResult<Value> {
    let mut result = value.clone();

    match &mut result {
        Value::Array(items) => {
            for item in items.iter_mut() {
                transform_one(item, spec)?;
            }
        }
        other => transform_one(other, spec)?,
    }

    Ok(result)
}

fn transform_one(item: &mut Value, spec: &TransformSpec) -> PipelineResult<()> {
    if let Value::Object(map) = item {
        if !spec.field_mappings.is_empty() {
            let mut renamed = Map::with_capacity(map.len());
            for (key, v) in std::mem::take(map) {
                let target = spec.field_mappings.get(&key).cloned().unwrap_or(key);
                renamed.insert(target, v);
            }
            *map = renamed;
        }
    }

    for vt in &spec.value_transforms {
        let Some(slot) = extract_mut(item, &vt.field) else {
            continue;
        };
        if slot.is_null() {
            continue;
        }
        *slot = apply_operation(slot, &vt.field, &vt.operation)?;
    }
    Ok(())
}

fn apply_operation(value: &Value, field: &str, op: &TransformOperation) -> PipelineResult<Value> {
    match op {
        TransformOperation::Multiply { factor } => {
            let n = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| PipelineError::NotNumeric {
                field: field.to_string(),
            })?;
            let product = n * factor;
            number_value(product).ok_or_else(|| PipelineError::NonFinite {
                field: field.to_string(),
            })
        }
        TransformOperation::FormatDate { locale } => {
            let date = parse_date(value).ok_or_else(|| PipelineError::InvalidDate {
                field: field.to_string(),
            })?;
            Ok(Value::String(format_date(&date, locale.as_deref())))
        }
        TransformOperation::Uppercase => match value {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            _ => Err(PipelineError::NotAString {
                field: field.to_string(),
            }),
        },
        TransformOperation::Lowercase => match value {
            Value::String(s) => Ok(Value::String(s.to_lowercase())),
            _ => Err(PipelineError::NotAString {
                field: field.to_string(),
            }),
        },
    }
}

/// Whole results stay integers so `2 * 3` renders as `6`, not `6.0`
fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(Value::Number)
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Millisecond timestamps are 13 digits for any date after 2001
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(Utc.from_utc_datetime(&dt));
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
            }
            s.parse::<i64>().ok().and_then(|n| parse_date(&Value::from(n)))
        }
        _ => None,
    }
}

/// Short date in the conventional order for a locale
fn format_date(date: &DateTime<Utc>, locale: Option<&str>) -> String {
    let locale = locale.unwrap_or("en-US").to_ascii_lowercase();
    let language = locale.split(['-', '_']).next().unwrap_or("en");
    let pattern = match (language, locale.as_str()) {
        (_, "en-us") | (_, "en") => "%-m/%-d/%Y",
        ("en", _) | ("fr", _) | ("es", _) | ("it", _) | ("pt", _) => "%d/%m/%Y",
        ("de", _) | ("ru", _) | ("pl", _) | ("tr", _) => "%d.%m.%Y",
        ("nl", _) => "%d-%m-%Y",
        ("ja", _) | ("zh", _) | ("ko", _) | ("sv", _) | ("iso", _) => "%Y-%m-%d",
        _ => "%Y-%m-%d",
    };
    date.format(pattern).to_string()
}

// ============================================================================
// Templates
// ============================================================================

/// Substitute `{{path}}` placeholders with values extracted from `value`.
/// Unknown placeholders are kept verbatim.
pub fn render_template(template: &str, value: &Value) -> String {
    TEMPLATE_VAR
        .replace_all(template, |caps: &Captures| {
            match extract_ref(value, &caps[1]) {
                Some(found) => scalar_to_string(found),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pipeline::ValueTransform;
    use serde_json::json;

    #[test]
    fn test_extract_flat_object_exact_values() {
        let data = json!({
            "int": 42,
            "float": 1.5,
            "neg": -7,
            "yes": true,
            "no": false,
            "nothing": null,
            "text": "hello",
            "list": [1, "two"],
            "obj": { "k": "v" }
        });
        for (key, expected) in data.as_object().unwrap() {
            assert_eq!(extract(&data, key).as_ref(), Some(expected), "key {}", key);
        }
    }

    #[test]
    fn test_extract_nested_and_indexed() {
        let data = json!({ "items": [{ "title": "Hello" }, { "title": "World" }] });
        assert_eq!(extract(&data, "items[0].title"), Some(json!("Hello")));
        assert_eq!(extract(&data, "items[1].title"), Some(json!("World")));
        assert_eq!(extract(&data, "items.1.title"), Some(json!("World")));
        assert_eq!(extract(&data, "items[2].title"), None);
        assert_eq!(extract(&data, "items[0].missing"), None);
        assert_eq!(extract(&data, "nope.deeper"), None);
    }

    #[test]
    fn test_extract_multi_index_and_root_array() {
        let data = json!({ "grid": [[1, 2], [3, 4]] });
        assert_eq!(extract(&data, "grid[1][0]"), Some(json!(3)));

        let root = json!([{ "a": 1 }, { "a": 2 }]);
        assert_eq!(extract(&root, "[1].a"), Some(json!(2)));
    }

    #[test]
    fn test_extract_malformed_path() {
        let data = json!({ "items": [1] });
        assert_eq!(extract(&data, "items[x]"), None);
        assert_eq!(extract(&data, "items[0"), None);
        assert_eq!(extract(&json!("scalar"), "a"), None);
    }

    #[test]
    fn test_extract_null_is_found() {
        let data = json!({ "a": null });
        assert_eq!(extract(&data, "a"), Some(Value::Null));
    }

    fn condition(field: &str, operator: FilterOperator, value: Value) -> FilterSpec {
        FilterSpec {
            filter_by: Some(FilterCondition {
                field: field.to_string(),
                operator,
                value,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_equals_preserves_order() {
        let data = json!([
            { "id": 1, "state": "open" },
            { "id": 2, "state": "closed" },
            { "id": 3, "state": "open" },
            { "id": 4 },
            { "id": 5, "state": "open" }
        ]);
        let result = filter(&data, &condition("state", FilterOperator::Equals, json!("open")));
        let ids: Vec<i64> = result
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn test_filter_equals_numbers_by_value() {
        let data = json!([{ "n": 1 }, { "n": 1.0 }, { "n": "1" }]);
        let result = filter(&data, &condition("n", FilterOperator::Equals, json!(1)));
        assert_eq!(result.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_filter_contains_and_not_empty() {
        let data = json!([
            { "title": "Rust release", "tags": ["lang"] },
            { "title": "Go release", "tags": [] },
            { "title": "", "tags": ["lang", "rust"] }
        ]);
        let result = filter(&data, &condition("title", FilterOperator::Contains, json!("Rust")));
        assert_eq!(result.as_array().unwrap().len(), 1);

        let result = filter(&data, &condition("tags", FilterOperator::Contains, json!("lang")));
        assert_eq!(result.as_array().unwrap().len(), 2);

        let result = filter(&data, &condition("title", FilterOperator::NotEmpty, Value::Null));
        assert_eq!(result.as_array().unwrap().len(), 2);

        let result = filter(&data, &condition("tags", FilterOperator::NotEmpty, Value::Null));
        assert_eq!(result.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_filter_greater_and_less_than() {
        let data = json!([{ "t": 5 }, { "t": 15 }, { "t": "20" }, { "t": null }]);
        let gt = filter(&data, &condition("t", FilterOperator::GreaterThan, json!(10)));
        assert_eq!(gt, json!([{ "t": 15 }, { "t": "20" }]));

        let lt = filter(&data, &condition("t", FilterOperator::LessThan, json!(10)));
        assert_eq!(lt, json!([{ "t": 5 }]));
    }

    #[test]
    fn test_filter_incomparable_value_fails_open() {
        let data = json!([{ "t": 5 }, { "t": 15 }]);
        let result = filter(&data, &condition("t", FilterOperator::GreaterThan, json!({ "x": 1 })));
        assert_eq!(result, data);
    }

    #[test]
    fn test_filter_limit_then_fields() {
        let data = json!([
            { "a": 1, "b": 2, "c": 3 },
            { "a": 4, "b": 5, "c": 6 },
            { "a": 7, "b": 8, "c": 9 }
        ]);
        let spec = FilterSpec {
            limit: Some(2),
            fields: Some(vec!["a".to_string(), "c".to_string()]),
            ..Default::default()
        };
        assert_eq!(filter(&data, &spec), json!([{ "a": 1, "c": 3 }, { "a": 4, "c": 6 }]));
    }

    #[test]
    fn test_filter_fields_on_object() {
        let data = json!({ "keep": 1, "drop": 2 });
        let spec = FilterSpec {
            fields: Some(vec!["keep".to_string()]),
            ..Default::default()
        };
        assert_eq!(filter(&data, &spec), json!({ "keep": 1 }));
    }

    #[test]
    fn test_transform_mappings_and_values() {
        let data = json!([
            { "temp": 10, "name": "oslo", "when": "2024-03-05T10:00:00Z" },
            { "temp": 2.5, "name": "Rome", "when": "2024-12-25" }
        ]);
        let spec = TransformSpec {
            field_mappings: [("temp".to_string(), "temperature".to_string())]
                .into_iter()
                .collect(),
            value_transforms: vec![
                ValueTransform {
                    field: "temperature".to_string(),
                    operation: TransformOperation::Multiply { factor: 2.0 },
                },
                ValueTransform {
                    field: "name".to_string(),
                    operation: TransformOperation::Uppercase,
                },
                ValueTransform {
                    field: "when".to_string(),
                    operation: TransformOperation::FormatDate {
                        locale: Some("de-DE".to_string()),
                    },
                },
            ],
        };
        let result = transform(&data, &spec);
        assert_eq!(
            result,
            json!([
                { "temperature": 20, "name": "OSLO", "when": "05.03.2024" },
                { "temperature": 5, "name": "ROME", "when": "25.12.2024" }
            ])
        );
    }

    #[test]
    fn test_transform_failure_returns_original() {
        let data = json!({ "price": "free" });
        let spec = TransformSpec {
            value_transforms: vec![ValueTransform {
                field: "price".to_string(),
                operation: TransformOperation::Multiply { factor: 3.0 },
            }],
            ..Default::default()
        };
        assert_eq!(transform(&data, &spec), data);
    }

    #[test]
    fn test_transform_skips_missing_fields() {
        let data = json!({ "a": "x" });
        let spec = TransformSpec {
            value_transforms: vec![ValueTransform {
                field: "b".to_string(),
                operation: TransformOperation::Lowercase,
            }],
            ..Default::default()
        };
        assert_eq!(transform(&data, &spec), data);
    }

    #[test]
    fn test_format_date_locales() {
        let date = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(format_date(&date, None), "3/5/2024");
        assert_eq!(format_date(&date, Some("en-GB")), "05/03/2024");
        assert_eq!(format_date(&date, Some("ja-JP")), "2024-03-05");
        assert_eq!(parse_date(&json!(1709640000)), Some(date));
        assert_eq!(parse_date(&json!(1709640000000_i64)), Some(date));
    }

    #[test]
    fn test_render_template() {
        let data = json!({ "title": "Release", "meta": { "version": 3 } });
        assert_eq!(
            render_template("{{title}} v{{ meta.version }} {{missing}}", &data),
            "Release v3 {{missing}}"
        );
    }
}
