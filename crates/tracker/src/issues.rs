//! Issue field access, search and the field catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use pointdown_core::item::Entity;
use pointdown_core::store::{FieldDef, FieldStore};

use crate::api::TrackerApi;
use crate::config::SEARCH_PAGE_SIZE;
use crate::error::TrackerError;
use crate::schema::{FieldResponse, IssueResponse, IssueWithNames, SearchPage};

impl TrackerApi {
    /// All fields of one issue plus the id-to-name map, for field discovery.
    pub async fn fetch_issue_with_names(&self, key: &str) -> Result<IssueWithNames, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "issue", key])?;
        let url = &url;

        self.with_retry("fetch_issue_with_names", || async move {
            let response = self
                .request(Method::GET, url.clone())
                .query(&[("expand", "names")])
                .send()
                .await?;
            Self::parse_response("fetch_issue_with_names", response).await
        })
        .await
    }

    /// Field id to schema type, from the field catalog.
    pub async fn field_schema_types(&self) -> Result<HashMap<String, String>, TrackerError> {
        let fields = self.list_fields().await?;
        Ok(fields
            .into_iter()
            .filter_map(|f| f.schema_type.map(|t| (f.id, t)))
            .collect())
    }

    async fn search_page(
        &self,
        jql: &str,
        field_id: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "search", "jql"])?;
        let body = json!({
            "jql": jql,
            "fields": ["summary", field_id],
            "maxResults": SEARCH_PAGE_SIZE,
            "nextPageToken": page_token,
        });
        let (url, body) = (&url, &body);

        self.with_retry("search", || async move {
            let response = self.request(Method::POST, url.clone()).json(body).send().await?;
            Self::parse_response("search", response).await
        })
        .await
    }
}

/// Project a search page onto entities, skipping issues whose tracked
/// field holds something other than a number.
fn readable_entities(issues: Vec<IssueResponse>, field_id: &str) -> Vec<Entity> {
    issues
        .into_iter()
        .filter_map(|issue| {
            let key = issue.key.clone();
            match issue.into_entity(field_id) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!(entity_key = %key, error = %e, "Skipping issue with unreadable field");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl FieldStore for TrackerApi {
    type Error = TrackerError;

    async fn fetch_entity(&self, key: &str, field_id: &str) -> Result<Entity, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "issue", key])?;
        let fields = format!("summary,{field_id}");
        let (url, fields) = (&url, fields.as_str());

        let issue: IssueResponse = self
            .with_retry("fetch_entity", || async move {
                let response = self
                    .request(Method::GET, url.clone())
                    .query(&[("fields", fields)])
                    .send()
                    .await?;
                Self::parse_response("fetch_entity", response).await
            })
            .await?;

        issue.into_entity(field_id)
    }

    async fn write_field(&self, key: &str, field_id: &str, value: f64) -> Result<(), TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "issue", key])?;
        let body = json!({ "fields": { field_id: value } });
        let (url, body) = (&url, &body);

        self.with_retry("write_field", || async move {
            let response = self.request(Method::PUT, url.clone()).json(body).send().await?;
            Self::ensure_success("write_field", response).await?;
            Ok(())
        })
        .await?;

        tracing::debug!(key, field_id, value, "Wrote field");
        Ok(())
    }

    async fn search(&self, jql: &str, field_id: &str) -> Result<Vec<Entity>, TrackerError> {
        let mut entities = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.search_page(jql, field_id, token.as_deref()).await?;
            let next = page.continuation().map(str::to_string);

            entities.extend(readable_entities(page.issues, field_id));

            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        tracing::debug!(count = entities.len(), "Search complete");
        Ok(entities)
    }

    async fn list_fields(&self) -> Result<Vec<FieldDef>, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "field"])?;
        let url = &url;

        let fields: Vec<FieldResponse> = self
            .with_retry("list_fields", || async move {
                let response = self.request(Method::GET, url.clone()).send().await?;
                Self::parse_response("list_fields", response).await
            })
            .await?;

        Ok(fields.into_iter().map(FieldDef::from).collect())
    }
}
