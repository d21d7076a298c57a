// Data Pipeline Models
// Filter and transform specifications attached to integrations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Filter specification applied after extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// Keep at most this many array elements, counted from the front
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub filter_by: Option<FilterCondition>,
    /// Allow-list of object keys to keep
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

/// A single predicate over an extracted field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    /// Dotted path into each element
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    NotEmpty,
}

/// Transform specification applied after filtering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSpec {
    /// old key -> new key
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub value_transforms: Vec<ValueTransform>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTransform {
    pub field: String,
    #[serde(flatten)]
    pub operation: TransformOperation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransformOperation {
    Multiply { factor: f64 },
    FormatDate {
        #[serde(default)]
        locale: Option<String>,
    },
    Uppercase,
    Lowercase,
}
