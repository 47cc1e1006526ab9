//! Narrow async interfaces to the document-management backend.
//!
//! Each wizard depends only on the trait of the service it talks to, so a
//! flow can be driven against [`HttpClient`] in production and against
//! [`MemoryBackend`] (or a hand-written mock) in tests and offline mode.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{
    ApprovalGroup, ApprovalGroupRequest, Circuit, CircuitRequest, DocumentType, Element,
    ElementType, EntityId, GeneralAccount, GeneralAccountRequest, Ligne, LigneRequest, Location,
    OverlapCheck, RegisteredUser, RegistrationRequest, SubType, SubTypeRequest, User,
};
use crate::errors::ApiResult;

pub use http::HttpClient;
pub use memory::MemoryBackend;

/// Reference list shared by the circuit and sub-type services.
#[async_trait]
pub trait DocumentTypeApi: Send + Sync {
    async fn list_document_types(&self) -> ApiResult<Vec<DocumentType>>;
}

#[async_trait]
pub trait ApprovalApi: Send + Sync {
    /// Users that may be added to a group. When editing, the group's current
    /// members are excluded.
    async fn list_eligible_approvers(&self, exclude_group: Option<EntityId>)
        -> ApiResult<Vec<User>>;

    async fn group_name_available(&self, name: &str, exclude_id: Option<EntityId>)
        -> ApiResult<bool>;

    async fn create_group(&self, request: ApprovalGroupRequest) -> ApiResult<ApprovalGroup>;

    async fn update_group(
        &self,
        id: EntityId,
        request: ApprovalGroupRequest,
    ) -> ApiResult<ApprovalGroup>;
}

#[async_trait]
pub trait CircuitApi: DocumentTypeApi {
    async fn circuit_code_available(&self, code: &str, exclude_id: Option<EntityId>)
        -> ApiResult<bool>;

    async fn create_circuit(&self, request: CircuitRequest) -> ApiResult<Circuit>;

    async fn update_circuit(&self, id: EntityId, request: CircuitRequest) -> ApiResult<Circuit>;
}

#[async_trait]
pub trait LineApi: Send + Sync {
    async fn list_elements(&self, element_type: ElementType) -> ApiResult<Vec<Element>>;

    async fn list_locations(&self) -> ApiResult<Vec<Location>>;

    /// Codes of the lines already attached to a document.
    async fn list_line_codes(&self, document_id: EntityId) -> ApiResult<Vec<String>>;

    async fn create_line(&self, request: LigneRequest) -> ApiResult<Ligne>;

    async fn update_line(&self, id: EntityId, request: LigneRequest) -> ApiResult<Ligne>;
}

#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn account_code_available(&self, code: &str, exclude_id: Option<EntityId>)
        -> ApiResult<bool>;

    async fn create_account(&self, request: GeneralAccountRequest) -> ApiResult<GeneralAccount>;

    async fn update_account(
        &self,
        id: EntityId,
        request: GeneralAccountRequest,
    ) -> ApiResult<GeneralAccount>;
}

#[async_trait]
pub trait SubTypeApi: DocumentTypeApi {
    async fn sub_type_prefix_available(
        &self,
        document_type_id: EntityId,
        prefix: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool>;

    async fn check_overlap(
        &self,
        document_type_id: EntityId,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<OverlapCheck>;

    async fn create_sub_type(&self, request: SubTypeRequest) -> ApiResult<SubType>;

    async fn update_sub_type(&self, id: EntityId, request: SubTypeRequest) -> ApiResult<SubType>;
}

#[async_trait]
pub trait RegistrationApi: Send + Sync {
    async fn username_available(&self, username: &str) -> ApiResult<bool>;

    async fn email_available(&self, email: &str) -> ApiResult<bool>;

    async fn register(&self, request: RegistrationRequest) -> ApiResult<RegisteredUser>;
}
