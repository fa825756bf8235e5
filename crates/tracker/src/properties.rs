//! Entity-property store backed by the Jira bulk property endpoints.
//!
//! Conditional writes use `PUT /rest/api/3/issue/properties/{key}` with a
//! filter (`hasProperty: false` or `currentValue`), conditional deletes use
//! `DELETE` on the same path. Jira usually answers `303 See Other` with the
//! task to poll in `Location`. The filter only decides which entities the
//! operation touches, so an accepted request says nothing about what ends
//! up stored; the lock manager reads the property back before trusting it.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Method, Response, StatusCode};
use serde_json::{json, Value};

use pointdown_core::retry::{retry_until, Attempt, RetryError};
use pointdown_core::store::{Expected, PropertyStore, SetOutcome, TaskHandle, TaskOutcome, TaskState};
use pointdown_core::types::EntityId;

use crate::api::TrackerApi;
use crate::error::TrackerError;
use crate::schema::{task_id_from_url, PropertyResponse, TaskRef, TaskStatusResponse};

/// Request body for a conditional bulk set.
pub fn bulk_set_body(entity_id: EntityId, expected: &Expected, value: &Value) -> Value {
    let filter = match expected {
        Expected::Absent => json!({ "entityIds": [entity_id], "hasProperty": false }),
        Expected::Equals(current) => json!({ "entityIds": [entity_id], "currentValue": current }),
    };
    json!({ "value": value, "filter": filter })
}

/// Request body for a conditional bulk delete.
pub fn bulk_delete_body(entity_id: EntityId, expected: &Value) -> Value {
    json!({ "entityIds": [entity_id], "currentValue": expected })
}

impl TrackerApi {
    /// Interpret the acknowledgement of a bulk property operation.
    async fn bulk_outcome(
        operation: &'static str,
        response: Response,
    ) -> Result<SetOutcome, TrackerError> {
        let status = response.status();

        if status == StatusCode::CONFLICT || status == StatusCode::PRECONDITION_FAILED {
            return Ok(SetOutcome::Rejected);
        }

        if status == StatusCode::SEE_OTHER || status == StatusCode::ACCEPTED {
            if let Some(id) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(task_id_from_url)
            {
                return Ok(SetOutcome::Pending(TaskHandle { id }));
            }

            let bytes = response.bytes().await?;
            let task: TaskRef = serde_json::from_slice(&bytes).unwrap_or_default();
            return task
                .task_id
                .or_else(|| task.self_url.as_deref().and_then(task_id_from_url))
                .map(|id| SetOutcome::Pending(TaskHandle { id }))
                .ok_or_else(|| {
                    TrackerError::schema(operation, "async acknowledgement without a task reference")
                });
        }

        if status.is_success() {
            return Ok(SetOutcome::Applied);
        }

        Err(Self::api_error(operation, response).await)
    }
}

#[async_trait]
impl PropertyStore for TrackerApi {
    type Error = TrackerError;

    async fn conditional_set(
        &self,
        entity_id: EntityId,
        key: &str,
        expected: &Expected,
        value: &Value,
    ) -> Result<SetOutcome, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "issue", "properties", key])?;
        let body = bulk_set_body(entity_id, expected, value);
        let (url, body) = (&url, &body);

        tracing::debug!(entity_id, key, expected = ?expected, "Conditional property set");

        self.with_retry("conditional_set", || async move {
            let response = self.request(Method::PUT, url.clone()).json(body).send().await?;
            Self::bulk_outcome("conditional_set", response).await
        })
        .await
    }

    async fn conditional_delete(
        &self,
        entity_id: EntityId,
        key: &str,
        expected: &Value,
    ) -> Result<SetOutcome, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "issue", "properties", key])?;
        let body = bulk_delete_body(entity_id, expected);
        let (url, body) = (&url, &body);

        tracing::debug!(entity_id, key, "Conditional property delete");

        self.with_retry("conditional_delete", || async move {
            let response = self.request(Method::DELETE, url.clone()).json(body).send().await?;
            Self::bulk_outcome("conditional_delete", response).await
        })
        .await
    }

    async fn get(&self, entity_id: EntityId, key: &str) -> Result<Option<Value>, TrackerError> {
        let id = entity_id.to_string();
        let url = self.endpoint(&["rest", "api", "3", "issue", &id, "properties", key])?;
        let url = &url;

        self.with_retry("get_property", || async move {
            let response = self.request(Method::GET, url.clone()).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let property: PropertyResponse = Self::parse_response("get_property", response).await?;
            Ok(Some(property.value))
        })
        .await
    }

    async fn await_task(&self, handle: &TaskHandle) -> Result<TaskOutcome, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "task", &handle.id])?;
        let url = &url;

        let policy = self.config().task_poll.policy();
        let polled: Result<TaskOutcome, RetryError<TrackerError, String>> =
            retry_until(&policy, |attempt| async move {
            let task: TaskStatusResponse = self
                .with_retry("task_status", || async move {
                    let response = self.request(Method::GET, url.clone()).send().await?;
                    Self::parse_response("task_status", response).await
                })
                .await?;

            tracing::debug!(task_id = %handle.id, attempt, status = %task.status, "Polled task");

            Ok(match TaskState::classify(&task.status) {
                TaskState::Succeeded => Attempt::Done(TaskOutcome::Succeeded),
                TaskState::Failed => Attempt::Done(TaskOutcome::Failed(
                    task.message.unwrap_or(task.status),
                )),
                TaskState::Running => Attempt::Retry(task.status),
            })
        })
        .await;

        match polled {
            Ok(outcome) => Ok(outcome),
            Err(RetryError::Aborted(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last, .. }) => {
                tracing::warn!(
                    task_id = %handle.id,
                    attempts,
                    last_status = last.as_deref().unwrap_or("unknown"),
                    "Task did not finish in time",
                );
                Ok(TaskOutcome::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_body_for_absent() {
        let body = bulk_set_body(10001, &Expected::Absent, &json!({"owner": "a"}));
        assert_eq!(
            body,
            json!({
                "value": {"owner": "a"},
                "filter": {"entityIds": [10001], "hasProperty": false},
            })
        );
    }

    #[test]
    fn set_body_for_current_value() {
        let prior = json!({"owner": "b", "nonce": "n", "expiresAt": 1});
        let body = bulk_set_body(7, &Expected::Equals(prior.clone()), &json!({"owner": "a"}));
        assert_eq!(body["filter"]["currentValue"], prior);
        assert_eq!(body["filter"]["entityIds"], json!([7]));
        assert!(body["filter"].get("hasProperty").is_none());
    }

    #[test]
    fn delete_body_names_current_value() {
        let prior = json!({"nonce": "n"});
        assert_eq!(
            bulk_delete_body(3, &prior),
            json!({"entityIds": [3], "currentValue": {"nonce": "n"}})
        );
    }
}
