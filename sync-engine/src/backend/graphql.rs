//! GraphQL-over-HTTP implementation of [`WriterBackend`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{
    Critic, CriticRequest, DocumentKey, DocumentVersion, GenerationKind, GenerationRequest,
    JobAck, ProjectId,
};
use std::time::Duration;

use super::{BackendError, WriterBackend};

const VERSION_FIELDS: &str =
    "id versionNumber versionType textContent textNotes textSeed sourceVersionNumber";

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVersionsData {
    list_versions: Vec<DocumentVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCriticsData {
    list_critics: Vec<Critic>,
}

#[derive(Debug, Clone)]
pub struct GraphqlBackend {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl GraphqlBackend {
    pub fn new(
        api_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/graphql", api_url.trim_end_matches('/')),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, BackendError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(describe_http_error(response).await);
        }

        let body: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(BackendError::Graphql(messages.join("; ")));
        }
        body.data
            .ok_or_else(|| BackendError::Decode("response carried no data".to_string()))
    }

    /// Mutations return `{ <field>: { taskId } }`; the field name varies per document type.
    async fn execute_ack(
        &self,
        field: &str,
        query: &str,
        variables: Value,
    ) -> Result<JobAck, BackendError> {
        let mut data: Value = self.execute(query, variables).await?;
        let ack = data
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| BackendError::Decode(format!("missing field {field}")))?;
        serde_json::from_value(ack).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

async fn describe_http_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    BackendError::Status { status, message }
}

fn text_argument(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::Seed => "textSeed",
        GenerationKind::Edit => "textContent",
        GenerationKind::Notes => "textNotes",
    }
}

fn key_variables(key: &DocumentKey) -> Value {
    json!({
        "documentType": key.document_type,
        "projectId": key.project_id,
        "sceneKey": key.scene_key,
        "sceneTextId": key.scene_text_id,
    })
}

#[async_trait]
impl WriterBackend for GraphqlBackend {
    async fn list_versions(
        &self,
        key: &DocumentKey,
    ) -> Result<Vec<DocumentVersion>, BackendError> {
        let query = format!(
            "query ListVersions($key: DocumentKeyInput!) {{ listVersions(key: $key) {{ {VERSION_FIELDS} }} }}"
        );
        let data: ListVersionsData = self
            .execute(&query, json!({ "key": key_variables(key) }))
            .await?;
        Ok(data.list_versions)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<JobAck, BackendError> {
        let field = format!("generate{}", request.key.document_type.as_str());
        let argument = text_argument(request.kind);
        let query = format!(
            "mutation Generate($key: DocumentKeyInput!, $text: String!, $start: Int, $end: Int) {{ \
             {field}(key: $key, {argument}: $text, selectTextStart: $start, selectTextEnd: $end) {{ taskId }} }}"
        );
        let variables = json!({
            "key": key_variables(&request.key),
            "text": request.text,
            "start": request.select_text_start,
            "end": request.select_text_end,
        });
        self.execute_ack(&field, &query, variables).await
    }

    async fn generate_with_critics(
        &self,
        request: &CriticRequest,
    ) -> Result<JobAck, BackendError> {
        let field = "generateWithCritics";
        let query = "mutation GenerateWithCritics($key: DocumentKeyInput!, $criticIds: [ID!]!, $start: Int, $end: Int) { \
             generateWithCritics(key: $key, criticIds: $criticIds, selectTextStart: $start, selectTextEnd: $end) { taskId } }";
        let variables = json!({
            "key": key_variables(&request.key),
            "criticIds": request.critic_ids,
            "start": request.select_text_start,
            "end": request.select_text_end,
        });
        self.execute_ack(field, query, variables).await
    }

    async fn list_critics(&self, project_id: &ProjectId) -> Result<Vec<Critic>, BackendError> {
        let query =
            "query ListCritics($projectId: ID!) { listCritics(projectId: $projectId) { id name description } }";
        let data: ListCriticsData = self
            .execute(query, json!({ "projectId": project_id }))
            .await?;
        Ok(data.list_critics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let backend =
            GraphqlBackend::new("http://localhost:8080/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:8080/graphql");
    }

    #[test]
    fn test_text_argument_per_kind() {
        assert_eq!(text_argument(GenerationKind::Seed), "textSeed");
        assert_eq!(text_argument(GenerationKind::Edit), "textContent");
        assert_eq!(text_argument(GenerationKind::Notes), "textNotes");
    }

    #[test]
    fn test_key_variables_shape() {
        let key = DocumentKey::script("p-1", "sc-2", "v5");
        let vars = key_variables(&key);
        assert_eq!(vars["documentType"], "Script");
        assert_eq!(vars["sceneKey"], "sc-2");
        assert_eq!(vars["sceneTextId"], "v5");

        let story = key_variables(&DocumentKey::story("p-1"));
        assert!(story["sceneKey"].is_null());
    }

    #[test]
    fn test_graphql_errors_deserialize() {
        let raw = r#"{"data":null,"errors":[{"message":"not found"}]}"#;
        let body: GraphqlResponse<ListVersionsData> = serde_json::from_str(raw).unwrap();
        assert!(body.data.is_none());
        assert_eq!(body.errors[0].message, "not found");
    }
}
