//! Translates a [`SearchRequest`] into an index bool query. Building is a
//! pure function of the request: the builder holds no interior state, absent
//! inputs omit their clause, and two builds of the same request are equal.

use models::{SearchRequest, SortOrder};
use serde_json::{json, Map, Value};

/// Page size ceiling; larger requests are clamped, not rejected.
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Fields targeted by the free-text clause, with their boosts.
const TEXT_SEARCH_FIELDS: &[&str] = &[
    "text",
    "metadata.subject^1.5",
    "metadata.case_name^1.5",
    "file_name",
];

/// Text fields whose sorting must be rewritten to the keyword sub-field.
const KEYWORD_SORTABLE: &[&str] = &[
    "file_name",
    "metadata.document_name",
    "metadata.subject",
    "metadata.case_name",
    "metadata.court_name",
    "metadata.judge_name",
    "metadata.author",
];

pub struct QueryBuilder {
    request: SearchRequest,
}

impl QueryBuilder {
    pub fn new(request: SearchRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Swap in a new request; nothing from the previous build is retained.
    pub fn reset(&mut self, request: SearchRequest) {
        self.request = request;
    }

    /// Build the full search body. Idempotent: the builder is never mutated.
    pub fn build(&self) -> Result<Value, models::InvalidDateRange> {
        let request = &self.request;

        let mut bool_query = Map::new();
        if let Some(text) = request.query.as_deref().filter(|q| !q.trim().is_empty()) {
            let mut multi_match = json!({
                "query": text,
                "fields": TEXT_SEARCH_FIELDS,
                "type": "best_fields",
            });
            if request.fuzzy_search {
                multi_match["fuzziness"] = json!("AUTO");
            }
            bool_query.insert("must".to_string(), json!([{ "multi_match": multi_match }]));
        }

        let filters = self.filter_clauses()?;
        if !filters.is_empty() {
            bool_query.insert("filter".to_string(), Value::Array(filters));
        }

        let query = if bool_query.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "bool": bool_query })
        };

        let mut body = Map::new();
        body.insert("query".to_string(), query);
        body.insert("from".to_string(), json!(request.from.unwrap_or(0)));
        body.insert(
            "size".to_string(),
            json!(request
                .size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE)),
        );
        body.insert("sort".to_string(), self.sort_clause());

        if request.include_highlights {
            body.insert(
                "highlight".to_string(),
                json!({
                    "pre_tags": ["<mark>"],
                    "post_tags": ["</mark>"],
                    "fields": {
                        "text": { "fragment_size": 150, "number_of_fragments": 3 },
                        "metadata.subject": { "fragment_size": 150, "number_of_fragments": 3 },
                        "metadata.case_name": { "fragment_size": 150, "number_of_fragments": 3 }
                    }
                }),
            );
        }

        Ok(Value::Object(body))
    }

    fn filter_clauses(&self) -> Result<Vec<Value>, models::InvalidDateRange> {
        let filters = &self.request.filters;
        let mut clauses = Vec::new();

        scalar_filter(&mut clauses, "metadata.category", filters.category.as_deref());
        scalar_filter(
            &mut clauses,
            "metadata.document_type",
            filters.doc_type.as_deref(),
        );
        scalar_filter(
            &mut clauses,
            "metadata.court_name.keyword",
            filters.court.as_deref(),
        );
        scalar_filter(
            &mut clauses,
            "metadata.judge_name.keyword",
            filters.judge.as_deref(),
        );
        scalar_filter(
            &mut clauses,
            "metadata.author.keyword",
            filters.author.as_deref(),
        );
        scalar_filter(&mut clauses, "metadata.status", filters.status.as_deref());
        scalar_filter(
            &mut clauses,
            "metadata.case_number",
            filters.case_number.as_deref(),
        );
        scalar_filter(
            &mut clauses,
            "metadata.case_name.keyword",
            filters.case_name.as_deref(),
        );

        let tags: Vec<&str> = filters
            .legal_tags
            .iter()
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            if filters.legal_tags_match_all {
                // AND semantics: one term clause per tag.
                for tag in tags {
                    clauses.push(json!({ "term": { "metadata.legal_tags": tag } }));
                }
            } else {
                clauses.push(json!({ "terms": { "metadata.legal_tags": tags } }));
            }
        }

        if let Some(range) = &self.request.date_range {
            range.validate()?;
            if !range.is_empty() {
                let mut bounds = Map::new();
                if let Some(from) = range.from {
                    bounds.insert("gte".to_string(), json!(from.to_rfc3339()));
                }
                if let Some(to) = range.to {
                    bounds.insert("lte".to_string(), json!(to.to_rfc3339()));
                }
                let mut range = Map::new();
                range.insert(self.date_field(), Value::Object(bounds));
                clauses.push(json!({ "range": range }));
            }
        }

        Ok(clauses)
    }

    fn date_field(&self) -> String {
        match self.request.date_field.as_deref() {
            None | Some("created_at") => "created_at".to_string(),
            Some("updated_at") => "updated_at".to_string(),
            // Metadata dates live under the metadata object.
            Some(other) => format!("metadata.{other}"),
        }
    }

    fn sort_clause(&self) -> Value {
        match self.request.sort_by.as_deref().filter(|s| !s.is_empty()) {
            Some(field) => {
                let field = if KEYWORD_SORTABLE.contains(&field) {
                    format!("{field}.keyword")
                } else {
                    field.to_string()
                };
                let mut clause = Map::new();
                clause.insert(
                    field,
                    json!({ "order": self.request.sort_order.as_str() }),
                );
                json!([clause])
            }
            None => {
                if self.request.query.as_deref().is_some_and(|q| !q.is_empty()) {
                    json!([{ "_score": { "order": "desc" } }])
                } else {
                    json!([{ "created_at": { "order": SortOrder::default().as_str() } }])
                }
            }
        }
    }
}

/// term for plain scalars, wildcard when the value carries `*` or `?`.
fn scalar_filter(clauses: &mut Vec<Value>, field: &str, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    if value.contains('*') || value.contains('?') {
        clauses.push(json!({ "wildcard": { field: { "value": value } } }));
    } else {
        clauses.push(json!({ "term": { field: value } }));
    }
}
