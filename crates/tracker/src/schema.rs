//! Typed Jira response bodies.
//!
//! Every JSON body is deserialized into one of these records at the
//! boundary; conversion into domain types rejects shapes the sync engine
//! cannot use instead of letting `null` leak into arithmetic.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use pointdown_core::item::Entity;
use pointdown_core::store::FieldDef;

use crate::error::TrackerError;

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// `GET /rest/api/3/issue/{key}` and each element of a search page.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueResponse {
    /// Jira sends numeric ids as strings.
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl IssueResponse {
    /// Project onto an [`Entity`], reading `field_id` as the tracked value.
    ///
    /// An absent or `null` field reads as 0; any other non-number is a
    /// schema error.
    pub fn into_entity(self, field_id: &str) -> Result<Entity, TrackerError> {
        let field_value = match self.fields.get(field_id) {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
                TrackerError::schema("read_field", format!("{field_id} on {} is not finite", self.key))
            })?,
            Some(other) => {
                return Err(TrackerError::schema(
                    "read_field",
                    format!("{field_id} on {} is not a number: {other}", self.key),
                ))
            }
        };

        let summary = self
            .fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Entity {
            id: self.id.trim().parse().ok(),
            key: self.key,
            summary,
            field_value,
        })
    }
}

/// `GET /rest/api/3/issue/{key}?expand=names`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueWithNames {
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Field id to display name.
    #[serde(default)]
    pub names: HashMap<String, String>,
}

/// `POST /rest/api/3/search/jql`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub issues: Vec<IssueResponse>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: bool,
}

impl SearchPage {
    /// Token for the next page, or `None` when this is the last page.
    pub fn continuation(&self) -> Option<&str> {
        if self.is_last {
            return None;
        }
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Field catalog
// ---------------------------------------------------------------------------

/// One element of `GET /rest/api/3/field`.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldResponse {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub schema: Option<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub items: Option<String>,
}

impl From<FieldResponse> for FieldDef {
    fn from(f: FieldResponse) -> Self {
        Self {
            name: f.name.unwrap_or_else(|| f.id.clone()),
            schema_type: f.schema.and_then(|s| s.kind.or(s.items)),
            id: f.id,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity properties and tasks
// ---------------------------------------------------------------------------

/// `GET /rest/api/3/issue/{id}/properties/{key}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyResponse {
    pub key: String,
    pub value: Value,
}

/// Body of a bulk-operation acknowledgement, when Jira sends one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub task_id: Option<String>,
    #[serde(rename = "self")]
    pub self_url: Option<String>,
}

/// `GET /rest/api/3/task/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /rest/api/3/myself`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Myself {
    pub account_id: String,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Extract a task id from a `Location` header or a task `self` URL.
///
/// Takes the last non-empty path segment, ignoring any query string.
pub fn task_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn issue(fields: Value) -> IssueResponse {
        serde_json::from_value(json!({"id": "10042", "key": "ABC-7", "fields": fields})).unwrap()
    }

    #[test]
    fn entity_from_numeric_field() {
        let entity = issue(json!({"summary": "Login", "customfield_10022": 2.5}))
            .into_entity("customfield_10022")
            .unwrap();
        assert_eq!(entity.id, Some(10042));
        assert_eq!(entity.key, "ABC-7");
        assert_eq!(entity.summary, "Login");
        assert_eq!(entity.field_value, 2.5);
    }

    #[test]
    fn absent_or_null_field_reads_as_zero() {
        let absent = issue(json!({})).into_entity("customfield_10022").unwrap();
        assert_eq!(absent.field_value, 0.0);

        let null = issue(json!({"customfield_10022": null}))
            .into_entity("customfield_10022")
            .unwrap();
        assert_eq!(null.field_value, 0.0);
    }

    #[test]
    fn non_numeric_field_is_schema_error() {
        let err = issue(json!({"customfield_10022": "three"}))
            .into_entity("customfield_10022")
            .unwrap_err();
        assert_matches!(err, TrackerError::Schema { operation: "read_field", .. });
    }

    #[test]
    fn unparseable_id_becomes_none() {
        let raw: IssueResponse =
            serde_json::from_value(json!({"id": "n/a", "key": "ABC-8", "fields": {}})).unwrap();
        assert_eq!(raw.into_entity("x").unwrap().id, None);
    }

    #[test]
    fn search_page_continuation() {
        let page: SearchPage = serde_json::from_value(json!({
            "issues": [],
            "nextPageToken": "abc",
        }))
        .unwrap();
        assert_eq!(page.continuation(), Some("abc"));

        let last: SearchPage = serde_json::from_value(json!({
            "issues": [],
            "nextPageToken": "abc",
            "isLast": true,
        }))
        .unwrap();
        assert_eq!(last.continuation(), None);

        let no_token: SearchPage = serde_json::from_value(json!({"issues": []})).unwrap();
        assert_eq!(no_token.continuation(), None);
    }

    #[test]
    fn field_def_prefers_schema_type() {
        let raw: FieldResponse = serde_json::from_value(json!({
            "id": "customfield_10022",
            "name": "Story Points",
            "schema": {"type": "number", "custom": "com.atlassian.jira.plugin.system.customfieldtypes:float"},
        }))
        .unwrap();
        let def = FieldDef::from(raw);
        assert_eq!(def.name, "Story Points");
        assert_eq!(def.schema_type.as_deref(), Some("number"));
    }

    #[test]
    fn task_id_from_location() {
        assert_eq!(
            task_id_from_url("https://acme.atlassian.net/rest/api/3/task/10641").as_deref(),
            Some("10641")
        );
        assert_eq!(
            task_id_from_url("/rest/api/3/task/10641/?x=1").as_deref(),
            Some("10641")
        );
        assert_eq!(task_id_from_url(""), None);
    }
}
