//! ClickUp REST API client.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::WorkspaceError;
use super::{NewTask, WorkspaceApi};
use crate::profile::Credential;
use crate::task::TaskId;

/// ClickUp API v2 client.
///
/// One request at a time, no retries; the reqwest defaults apply for timeouts.
#[derive(Debug, Clone)]
pub struct ClickUpClient {
    client: Client,
    api_url: Url,
}

impl ClickUpClient {
    /// `api_url` is the v2 base, e.g. `https://api.clickup.com/api/v2`.
    pub fn new(api_url: &str) -> Result<Self, url::ParseError> {
        let api_url = Url::parse(api_url)?;
        if api_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            client: Client::new(),
            api_url,
        })
    }

    /// Append `segments` to the API base, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// POST a JSON body and return the success status and raw response body.
    async fn post_json<B>(
        &self,
        credential: &Credential,
        segments: &[&str],
        body: &B,
    ) -> Result<(u16, String), WorkspaceError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments);
        let endpoint = format!("POST {}", url.path());
        let response = self
            .client
            .post(url)
            // ClickUp takes the raw token, without a "Bearer" prefix.
            .header("Authorization", credential.expose())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| WorkspaceError::network(&endpoint, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| WorkspaceError::network(&endpoint, &e))?;

        if !status.is_success() {
            return Err(WorkspaceError::status(&endpoint, status.as_u16(), &text));
        }

        Ok((status.as_u16(), text))
    }
}

/// Unix milliseconds of UTC midnight on `date`, as ClickUp expects.
pub(crate) fn start_date_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

#[derive(Debug, Serialize)]
struct CreateTaskBody<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Serialize)]
struct DependencyBody<'a> {
    depends_on: &'a str,
}

#[async_trait]
impl WorkspaceApi for ClickUpClient {
    async fn create_task(
        &self,
        credential: &Credential,
        list_id: &str,
        task: &NewTask,
    ) -> Result<TaskId, WorkspaceError> {
        let body = CreateTaskBody {
            name: &task.name,
            description: &task.description,
            start_date: task.start_date.map(start_date_millis),
            parent: task.parent.as_ref().map(TaskId::as_str),
        };
        tracing::debug!(list_id, name = %task.name, parent = ?task.parent, "Creating ClickUp task");

        let segments = ["list", list_id, "task"];
        let (status, text) = self.post_json(credential, &segments, &body).await?;
        let created: CreatedTask = serde_json::from_str(&text).map_err(|e| {
            WorkspaceError::decode(
                format!("POST {}", self.endpoint(&segments).path()),
                status,
                format!("Failed to parse created task: {}", e),
            )
        })?;
        Ok(TaskId(created.id))
    }

    async fn add_dependency(
        &self,
        credential: &Credential,
        task_id: &TaskId,
        depends_on: &TaskId,
    ) -> Result<(), WorkspaceError> {
        tracing::debug!(%task_id, %depends_on, "Adding ClickUp dependency");
        // The response body carries nothing we need.
        self.post_json(
            credential,
            &["task", task_id.as_str(), "dependency"],
            &DependencyBody {
                depends_on: depends_on.as_str(),
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clickup::WorkspaceErrorKind;
    use mockito::{Matcher, Server};

    fn credential() -> Credential {
        Credential::new("pk_test")
    }

    #[test]
    fn test_start_date_millis() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(start_date_millis(date), 1_709_251_200_000);
    }

    #[tokio::test]
    async fn test_create_task_with_start_date() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/list/901/task")
            .match_header("authorization", "pk_test")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "Design",
                "description": "Draw it",
                "start_date": 1_709_251_200_000i64
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"abc123","name":"Design"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ClickUpClient::new(&server.url()).unwrap();
        let task = NewTask {
            name: "Design".to_string(),
            description: "Draw it".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            parent: None,
        };
        let id = client.create_task(&credential(), "901", &task).await.unwrap();
        assert_eq!(id, TaskId::new("abc123"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_subtask_sends_parent() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/list/901/task")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "Wireframes",
                "description": "",
                "parent": "abc123"
            })))
            .with_status(200)
            .with_body(r#"{"id":"sub1"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ClickUpClient::new(&server.url()).unwrap();
        let task = NewTask {
            name: "Wireframes".to_string(),
            description: String::new(),
            start_date: None,
            parent: Some(TaskId::new("abc123")),
        };
        let id = client.create_task(&credential(), "901", &task).await.unwrap();
        assert_eq!(id.as_str(), "sub1");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_add_dependency() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/task/t2/dependency")
            .match_body(Matcher::Json(serde_json::json!({"depends_on": "t1"})))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = ClickUpClient::new(&server.url()).unwrap();
        client
            .add_dependency(&credential(), &TaskId::new("t2"), &TaskId::new("t1"))
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/list/901/task")
            .with_status(401)
            .with_body(r#"{"err":"Token invalid","ECODE":"OAUTH_025"}"#)
            .create_async()
            .await;

        let client = ClickUpClient::new(&server.url()).unwrap();
        let task = NewTask {
            name: "X".to_string(),
            description: String::new(),
            start_date: None,
            parent: None,
        };
        let err = client
            .create_task(&credential(), "901", &task)
            .await
            .unwrap_err();
        assert_eq!(err.kind, WorkspaceErrorKind::Status);
        assert_eq!(err.status, Some(401));
        assert!(err.message.contains("Token invalid"));
    }

    #[tokio::test]
    async fn test_missing_id_is_decode_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/list/901/task")
            .with_status(200)
            .with_body(r#"{"name":"no id"}"#)
            .create_async()
            .await;

        let client = ClickUpClient::new(&server.url()).unwrap();
        let task = NewTask {
            name: "X".to_string(),
            description: String::new(),
            start_date: None,
            parent: None,
        };
        let err = client
            .create_task(&credential(), "901", &task)
            .await
            .unwrap_err();
        assert_eq!(err.kind, WorkspaceErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_list_id_cannot_escape_its_path_segment() {
        let mut server = Server::new_async().await;
        let other_endpoint = server
            .mock("POST", "/team/task")
            .with_status(200)
            .with_body(r#"{"id":"wrong"}"#)
            .expect(0)
            .create_async()
            .await;
        let encoded = server
            .mock("POST", Matcher::Regex(r"^/list/\.\.%2Fteam/task$".to_string()))
            .with_status(404)
            .with_body(r#"{"err":"List not found"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ClickUpClient::new(&server.url()).unwrap();
        let task = NewTask {
            name: "X".to_string(),
            description: String::new(),
            start_date: None,
            parent: None,
        };
        let err = client
            .create_task(&credential(), "../team", &task)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(404));
        other_endpoint.assert_async().await;
        encoded.assert_async().await;
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = ClickUpClient::new("https://api.clickup.com/api/v2").unwrap();
        assert_eq!(
            client.endpoint(&["list", "1?x=", "task"]).as_str(),
            "https://api.clickup.com/api/v2/list/1%3Fx=/task"
        );
        assert!(ClickUpClient::new("not a url").is_err());
    }
}
