use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{
    ApprovalGroup, ApprovalGroupRequest, Circuit, CircuitRequest, DocumentType, Element,
    ElementType, EntityId, GeneralAccount, GeneralAccountRequest, Ligne, LigneRequest, Location,
    OverlapCheck, RegisteredUser, RegistrationRequest, SubType, SubTypeRequest, User,
};
use crate::errors::{ApiError, ApiResult};

use super::{
    AccountApi, ApprovalApi, CircuitApi, DocumentTypeApi, LineApi, RegistrationApi, SubTypeApi,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of every `*-available` endpoint.
#[derive(Debug, Deserialize)]
struct Availability {
    available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OverlapQuery {
    document_type_id: EntityId,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclude_id: Option<EntityId>,
}

/// JSON client for the document-management REST API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClient {
    pub fn new(config: &Config) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::new_v4();
        debug!(%method, %url, %request_id, "api request");
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("X-Request-Id", request_id.to_string());
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.request(Method::GET, path).send().await?;
        decode(response).await
    }

    async fn get_with<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> ApiResult<T> {
        let response = self.request(Method::GET, path).query(query).send().await?;
        decode(response).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let response = self.request(method, path).json(body).send().await?;
        decode(response).await
    }

    async fn available(&self, path: &str, query: &[(&str, String)]) -> ApiResult<bool> {
        let availability: Availability = self.get_with(path, query).await?;
        Ok(availability.available)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    Err(match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        _ => ApiError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

/// Pulls `message`/`title` out of a JSON error body, or keeps a short plain-text body.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return ["message", "title", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string);
    }
    Some(body.chars().take(200).collect())
}

fn exclude_param(query: &mut Vec<(&str, String)>, exclude_id: Option<EntityId>) {
    if let Some(id) = exclude_id {
        query.push(("excludeId", id.to_string()));
    }
}

#[async_trait]
impl DocumentTypeApi for HttpClient {
    async fn list_document_types(&self) -> ApiResult<Vec<DocumentType>> {
        self.get("/DocumentTypes").await
    }
}

#[async_trait]
impl ApprovalApi for HttpClient {
    async fn list_eligible_approvers(
        &self,
        exclude_group: Option<EntityId>,
    ) -> ApiResult<Vec<User>> {
        match exclude_group {
            Some(group) => {
                self.get_with(
                    "/Approval/eligible-approvers",
                    &[("excludeGroupId", group.to_string())],
                )
                .await
            }
            None => self.get("/Approval/eligible-approvers").await,
        }
    }

    async fn group_name_available(
        &self,
        name: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        let mut query = vec![("name", name.to_string())];
        exclude_param(&mut query, exclude_id);
        self.available("/Approval/groups/name-available", &query).await
    }

    async fn create_group(&self, request: ApprovalGroupRequest) -> ApiResult<ApprovalGroup> {
        self.send_json(Method::POST, "/Approval/groups", &request).await
    }

    async fn update_group(
        &self,
        id: EntityId,
        request: ApprovalGroupRequest,
    ) -> ApiResult<ApprovalGroup> {
        self.send_json(Method::PUT, &format!("/Approval/groups/{}", id), &request)
            .await
    }
}

#[async_trait]
impl CircuitApi for HttpClient {
    async fn circuit_code_available(
        &self,
        code: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        let mut query = vec![("code", code.to_string())];
        exclude_param(&mut query, exclude_id);
        self.available("/Circuit/code-available", &query).await
    }

    async fn create_circuit(&self, request: CircuitRequest) -> ApiResult<Circuit> {
        self.send_json(Method::POST, "/Circuit", &request).await
    }

    async fn update_circuit(&self, id: EntityId, request: CircuitRequest) -> ApiResult<Circuit> {
        self.send_json(Method::PUT, &format!("/Circuit/{}", id), &request)
            .await
    }
}

#[async_trait]
impl LineApi for HttpClient {
    async fn list_elements(&self, element_type: ElementType) -> ApiResult<Vec<Element>> {
        let segment = match element_type {
            ElementType::Item => "item",
            ElementType::GeneralAccount => "general-account",
            ElementType::FixedAsset => "fixed-asset",
        };
        self.get(&format!("/LignesElements/{}/elements", segment)).await
    }

    async fn list_locations(&self) -> ApiResult<Vec<Location>> {
        self.get("/Locations").await
    }

    async fn list_line_codes(&self, document_id: EntityId) -> ApiResult<Vec<String>> {
        self.get(&format!("/Documents/{}/lignes/codes", document_id))
            .await
    }

    async fn create_line(&self, request: LigneRequest) -> ApiResult<Ligne> {
        self.send_json(Method::POST, "/Lignes", &request).await
    }

    async fn update_line(&self, id: EntityId, request: LigneRequest) -> ApiResult<Ligne> {
        self.send_json(Method::PUT, &format!("/Lignes/{}", id), &request)
            .await
    }
}

#[async_trait]
impl AccountApi for HttpClient {
    async fn account_code_available(
        &self,
        code: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        let mut query = vec![("code", code.to_string())];
        exclude_param(&mut query, exclude_id);
        self.available("/GeneralAccounts/code-available", &query).await
    }

    async fn create_account(&self, request: GeneralAccountRequest) -> ApiResult<GeneralAccount> {
        self.send_json(Method::POST, "/GeneralAccounts", &request).await
    }

    async fn update_account(
        &self,
        id: EntityId,
        request: GeneralAccountRequest,
    ) -> ApiResult<GeneralAccount> {
        self.send_json(Method::PUT, &format!("/GeneralAccounts/{}", id), &request)
            .await
    }
}

#[async_trait]
impl SubTypeApi for HttpClient {
    async fn sub_type_prefix_available(
        &self,
        document_type_id: EntityId,
        prefix: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        let mut query = vec![
            ("documentTypeId", document_type_id.to_string()),
            ("prefix", prefix.to_string()),
        ];
        exclude_param(&mut query, exclude_id);
        self.available("/SubTypes/prefix-available", &query).await
    }

    async fn check_overlap(
        &self,
        document_type_id: EntityId,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<OverlapCheck> {
        let query = OverlapQuery {
            document_type_id,
            start_date: start,
            end_date: end,
            exclude_id,
        };
        self.send_json(Method::POST, "/SubTypes/check-overlap", &query)
            .await
    }

    async fn create_sub_type(&self, request: SubTypeRequest) -> ApiResult<SubType> {
        self.send_json(Method::POST, "/SubTypes", &request).await
    }

    async fn update_sub_type(&self, id: EntityId, request: SubTypeRequest) -> ApiResult<SubType> {
        self.send_json(Method::PUT, &format!("/SubTypes/{}", id), &request)
            .await
    }
}

#[async_trait]
impl RegistrationApi for HttpClient {
    async fn username_available(&self, username: &str) -> ApiResult<bool> {
        self.available("/Auth/username-available", &[("username", username.to_string())])
            .await
    }

    async fn email_available(&self, email: &str) -> ApiResult<bool> {
        self.available("/Auth/email-available", &[("email", email.to_string())])
            .await
    }

    async fn register(&self, request: RegistrationRequest) -> ApiResult<RegisteredUser> {
        self.send_json(Method::POST, "/Auth/register", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_message_field() {
        assert_eq!(
            error_message(r#"{"message":"Code already used","status":409}"#).as_deref(),
            Some("Code already used")
        );
        assert_eq!(
            error_message(r#"{"title":"Validation failed"}"#).as_deref(),
            Some("Validation failed")
        );
        assert_eq!(error_message("  "), None);
        assert_eq!(error_message("gateway down").as_deref(), Some("gateway down"));
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let config = Config {
            api_base_url: "http://example.test/api/".into(),
            ..Config::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://example.test/api");
    }
}
