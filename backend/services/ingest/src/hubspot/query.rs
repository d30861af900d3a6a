use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOperator {
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

/// `{ "filterGroups": [ { "filters": [...] } ] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub filter_groups: Vec<FilterGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Ascending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub property_name: String,
    pub direction: SortDirection,
}

/// Body of `POST /crm/v3/objects/{type}/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(flatten)]
    pub filter: FilterSpec,
    pub sorts: Vec<Sort>,
    pub properties: Vec<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl SearchRequest {
    /// Ascending by `sort_property`. An `after` of 0 is the first page and
    /// is omitted from the body.
    pub fn new(
        filter: FilterSpec,
        sort_property: &str,
        properties: &[&str],
        limit: u32,
        after: u32,
    ) -> Self {
        Self {
            filter,
            sorts: vec![Sort {
                property_name: sort_property.to_string(),
                direction: SortDirection::Ascending,
            }],
            properties: properties.iter().map(|p| p.to_string()).collect(),
            limit,
            after: (after > 0).then(|| after.to_string()),
        }
    }
}

/// Build the modified-date window `[lower, upper]` as one filter group.
///
/// Bounds are epoch milliseconds rendered as strings. Without a lower bound
/// only the `LTE` filter is emitted, which selects everything modified up to
/// `upper`.
pub fn modified_range_filter(
    property_name: &str,
    lower: Option<DateTime<Utc>>,
    upper: DateTime<Utc>,
) -> FilterSpec {
    let mut filters = Vec::with_capacity(2);
    if let Some(lower) = lower {
        filters.push(Filter {
            property_name: property_name.to_string(),
            operator: FilterOperator::Gte,
            value: lower.timestamp_millis().to_string(),
        });
    }
    filters.push(Filter {
        property_name: property_name.to_string(),
        operator: FilterOperator::Lte,
        value: upper.timestamp_millis().to_string(),
    });

    FilterSpec {
        filter_groups: vec![FilterGroup { filters }],
    }
}
