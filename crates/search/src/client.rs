use super::{document_from_source, index_definition, IndexError, QueryBuilder};
use models::{Id, SearchHit, SearchRequest, SearchResponse};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub base_url: url::Url,
    #[serde(default = "IndexConfig::default_index")]
    pub index: String,
    #[serde(default = "IndexConfig::default_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,
}

impl IndexConfig {
    fn default_index() -> String {
        "documents".to_string()
    }
    fn default_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentStats {
    pub total_documents: u64,
    pub by_type: Vec<(String, u64)>,
    pub by_category: Vec<(String, u64)>,
}

/// REST client for the search index. Owns index bootstrap, document CRUD,
/// search execution, and the aggregations backing the field-option
/// endpoints.
pub struct IndexClient {
    http: reqwest::Client,
    config: IndexConfig,
}

impl IndexClient {
    pub fn new(config: IndexConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    pub fn index_name(&self) -> &str {
        &self.config.index
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    /// Create the index with the legal-analyzer mapping when it does not
    /// exist yet. Safe to call on every boot.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        let exists = self
            .http
            .head(self.url(&self.config.index))
            .send()
            .await?
            .status()
            .is_success();
        if exists {
            return Ok(());
        }

        tracing::info!(index = %self.config.index, "creating search index");
        let response = self
            .http
            .put(self.url(&self.config.index))
            .json(&index_definition())
            .send()
            .await?;
        check_response(response).await.map(|_| ())
    }

    #[tracing::instrument(skip(self, document), fields(id = %document.id))]
    pub async fn index_document(&self, document: &models::Document) -> Result<(), IndexError> {
        let body = super::to_index_document(document)?;
        let response = self
            .http
            .put(self.url(&format!("{}/_doc/{}", self.config.index, document.id)))
            .json(&body)
            .send()
            .await?;
        check_response(response).await.map(|_| ())
    }

    pub async fn get_document(&self, id: Id) -> Result<models::Document, IndexError> {
        let response = self
            .http
            .get(self.url(&format!("{}/_doc/{}", self.config.index, id)))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::NotFound(id.to_string()));
        }
        let value: Value = check_response(response).await?;
        document_from_source(value["_source"].clone())
    }

    pub async fn delete_document(&self, id: Id) -> Result<(), IndexError> {
        let response = self
            .http
            .delete(self.url(&format!("{}/_doc/{}", self.config.index, id)))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::NotFound(id.to_string()));
        }
        check_response(response).await.map(|_: Value| ())
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, IndexError> {
        let body = QueryBuilder::new(request.clone()).build()?;
        let response = self
            .http
            .post(self.url(&format!("{}/_search", self.config.index)))
            .json(&body)
            .send()
            .await?;
        let value: Value = check_response(response).await?;

        let total_hits = value["hits"]["total"]["value"].as_u64().unwrap_or(0);
        let search_time_ms = value["took"].as_u64().unwrap_or(0);

        let mut documents = Vec::new();
        for hit in value["hits"]["hits"].as_array().into_iter().flatten() {
            let document = document_from_source(hit["_source"].clone())?;
            documents.push(SearchHit {
                document,
                score: hit["_score"].as_f64(),
                highlights: hit.get("highlight").filter(|h| !h.is_null()).cloned(),
            });
        }

        Ok(SearchResponse {
            total_hits,
            documents,
            aggregations: value.get("aggregations").filter(|a| !a.is_null()).cloned(),
            search_time_ms,
        })
    }

    /// Distinct values of a metadata field, for the field-option endpoints.
    /// `search` narrows client-side by case-insensitive substring.
    pub async fn field_options(
        &self,
        field: &str,
        search: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, IndexError> {
        let body = json!({
            "size": 0,
            "aggs": { "options": { "terms": { "field": field, "size": limit.max(10) * 5 } } }
        });
        let response = self
            .http
            .post(self.url(&format!("{}/_search", self.config.index)))
            .json(&body)
            .send()
            .await?;
        let value: Value = check_response(response).await?;

        let needle = search.map(str::to_lowercase);
        let options = value["aggregations"]["options"]["buckets"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|bucket| bucket["key"].as_str().map(str::to_string))
            .filter(|key| match &needle {
                Some(needle) => key.to_lowercase().contains(needle),
                None => true,
            })
            .take(limit)
            .collect();
        Ok(options)
    }

    pub async fn stats(&self) -> Result<DocumentStats, IndexError> {
        let body = json!({
            "size": 0,
            "aggs": {
                "by_type": { "terms": { "field": "metadata.document_type", "size": 20 } },
                "by_category": { "terms": { "field": "metadata.category", "size": 20 } }
            }
        });
        let response = self
            .http
            .post(self.url(&format!("{}/_search", self.config.index)))
            .json(&body)
            .send()
            .await?;
        let value: Value = check_response(response).await?;

        Ok(DocumentStats {
            total_documents: value["hits"]["total"]["value"].as_u64().unwrap_or(0),
            by_type: buckets(&value["aggregations"]["by_type"]),
            by_category: buckets(&value["aggregations"]["by_category"]),
        })
    }

    pub async fn is_healthy(&self) -> bool {
        match self.http.get(self.url("_cluster/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn buckets(aggregation: &Value) -> Vec<(String, u64)> {
    aggregation["buckets"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|bucket| {
            Some((
                bucket["key"].as_str()?.to_string(),
                bucket["doc_count"].as_u64().unwrap_or(0),
            ))
        })
        .collect()
}

async fn check_response(response: reqwest::Response) -> Result<Value, IndexError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|err| IndexError::MalformedResponse(err.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    // The index refuses documents that contradict its mapping; that's a
    // terminal condition, not a retry.
    if status.as_u16() == 400
        && (body.contains("mapper_parsing_exception")
            || body.contains("strict_dynamic_mapping_exception")
            || body.contains("illegal_argument_exception"))
    {
        return Err(IndexError::MappingConflict(truncate(&body, 500)));
    }
    Err(IndexError::Status {
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

fn truncate(s: &str, max: usize) -> String {
    let mut cut = max.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s[..cut].to_string()
}
