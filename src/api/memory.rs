use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::domain::{
    AccountType, ApprovalGroup, ApprovalGroupRequest, Circuit, CircuitRequest, DocumentType,
    Element, ElementType, EntityId, GeneralAccount, GeneralAccountRequest, Ligne, LigneRequest,
    Location, OverlapCheck, RegisteredUser, RegistrationRequest, RuleType, SubType,
    SubTypeRequest, User,
};
use crate::errors::{ApiError, ApiResult};

use super::{
    AccountApi, ApprovalApi, CircuitApi, DocumentTypeApi, LineApi, RegistrationApi, SubTypeApi,
};

#[derive(Debug, Default)]
struct Store {
    next_id: EntityId,
    users: Vec<User>,
    groups: Vec<ApprovalGroup>,
    document_types: Vec<DocumentType>,
    circuits: Vec<Circuit>,
    elements: BTreeMap<&'static str, Vec<Element>>,
    locations: Vec<Location>,
    lines: Vec<Ligne>,
    accounts: Vec<GeneralAccount>,
    sub_types: Vec<SubType>,
    registered: Vec<RegisteredUser>,
}

impl Store {
    fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }
}

fn element_key(element_type: ElementType) -> &'static str {
    match element_type {
        ElementType::Item => "item",
        ElementType::GeneralAccount => "general-account",
        ElementType::FixedAsset => "fixed-asset",
    }
}

fn same_code(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// In-process backend used by the offline terminal mode and by tests.
///
/// Every mutating call is counted, and an optional latency is applied to
/// every call so timing-sensitive behavior can be exercised with a paused
/// tokio clock.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
    latency: Option<Duration>,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    probe_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                next_id: 100,
                ..Store::default()
            }),
            ..Self::default()
        }
    }

    /// Demo data for the offline terminal mode.
    pub fn seeded() -> Self {
        let backend = Self::new();
        {
            let mut store = backend.store();
            store.users = vec![
                User::new(1, "amartin").with_names("Alice", "Martin"),
                User::new(2, "bdupont").with_names("Bruno", "Dupont"),
                User::new(3, "cbernard").with_names("Chloe", "Bernard"),
                User::new(4, "dpetit").with_names("David", "Petit"),
                User::new(5, "erobert").with_names("Emma", "Robert"),
            ];
            store.document_types = vec![
                DocumentType::new(1, "FAC", "Invoice"),
                DocumentType::new(2, "BC", "Purchase order"),
                DocumentType::new(3, "BL", "Delivery note"),
            ];
            store.groups = vec![ApprovalGroup {
                id: 10,
                name: "Finance".into(),
                description: "Invoices above threshold".into(),
                comment: None,
                rule_type: RuleType::All,
                users: vec![store.users[0].clone(), store.users[1].clone()],
            }];
            store.circuits = vec![Circuit {
                id: 20,
                code: "CIR-FAC".into(),
                title: "Invoice validation".into(),
                descriptif: "Standard invoice circuit".into(),
                document_type_id: Some(1),
                is_active: true,
                has_ordered_flow: true,
                allow_backward_step: false,
                allow_skip_step: false,
            }];
            store.elements.insert(
                element_key(ElementType::Item),
                vec![
                    element(30, "PAPER", "A4 paper ream"),
                    element(31, "TONER", "Printer toner"),
                ],
            );
            store.elements.insert(
                element_key(ElementType::GeneralAccount),
                vec![element(32, "606100", "Office supplies")],
            );
            store.elements.insert(
                element_key(ElementType::FixedAsset),
                vec![element(33, "LAPTOP", "Laptop computer")],
            );
            store.locations = vec![
                Location {
                    id: 40,
                    code: "WH1".into(),
                    name: "Main warehouse".into(),
                },
                Location {
                    id: 41,
                    code: "WH2".into(),
                    name: "Secondary warehouse".into(),
                },
            ];
            store.accounts = vec![GeneralAccount {
                id: 50,
                code: "401000".into(),
                description: "Suppliers".into(),
                account_type: AccountType::Liability,
                lettrable: true,
                is_active: true,
            }];
            store.sub_types = vec![SubType {
                id: 60,
                document_type_id: 1,
                prefix: "FAC24".into(),
                name: "Invoices 2024".into(),
                description: String::new(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
                end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
                is_active: true,
            }];
        }
        backend
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        self.store().users = users;
        self
    }

    pub fn with_sub_types(self, sub_types: Vec<SubType>) -> Self {
        self.store().sub_types = sub_types;
        self
    }

    pub fn with_elements(self, element_type: ElementType, elements: Vec<Element>) -> Self {
        self.store().elements.insert(element_key(element_type), elements);
        self
    }

    pub fn with_lines(self, lines: Vec<Ligne>) -> Self {
        self.store().lines = lines;
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn groups(&self) -> Vec<ApprovalGroup> {
        self.store().groups.clone()
    }

    pub fn lines(&self) -> Vec<Ligne> {
        self.store().lines.clone()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn probe(&self) {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
    }

    async fn mutation(&self, counter: &AtomicUsize, operation: &str) {
        counter.fetch_add(1, Ordering::SeqCst);
        debug!(operation, "memory backend mutation");
        self.delay().await;
    }
}

fn element(id: EntityId, code: &str, description: &str) -> Element {
    Element {
        id,
        code: code.into(),
        description: description.into(),
    }
}

fn resolve_users(store: &Store, ids: &[EntityId]) -> ApiResult<Vec<User>> {
    ids.iter()
        .map(|id| {
            store
                .users
                .iter()
                .find(|user| user.id == *id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("User {}", id)))
        })
        .collect()
}

#[async_trait]
impl DocumentTypeApi for MemoryBackend {
    async fn list_document_types(&self) -> ApiResult<Vec<DocumentType>> {
        self.delay().await;
        Ok(self.store().document_types.clone())
    }
}

#[async_trait]
impl ApprovalApi for MemoryBackend {
    async fn list_eligible_approvers(
        &self,
        exclude_group: Option<EntityId>,
    ) -> ApiResult<Vec<User>> {
        self.delay().await;
        let store = self.store();
        let members: Vec<EntityId> = exclude_group
            .and_then(|id| store.groups.iter().find(|group| group.id == id))
            .map(|group| group.users.iter().map(|user| user.id).collect())
            .unwrap_or_default();
        Ok(store
            .users
            .iter()
            .filter(|user| !members.contains(&user.id))
            .cloned()
            .collect())
    }

    async fn group_name_available(
        &self,
        name: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        self.probe().await;
        Ok(!self
            .store()
            .groups
            .iter()
            .any(|group| Some(group.id) != exclude_id && same_code(&group.name, name)))
    }

    async fn create_group(&self, request: ApprovalGroupRequest) -> ApiResult<ApprovalGroup> {
        self.mutation(&self.create_calls, "create_group").await;
        let mut store = self.store();
        if store.groups.iter().any(|group| same_code(&group.name, &request.name)) {
            return Err(ApiError::Conflict(format!(
                "An approval group named '{}' already exists",
                request.name
            )));
        }
        let users = resolve_users(&store, &request.user_ids)?;
        let group = ApprovalGroup {
            id: store.allocate_id(),
            name: request.name,
            description: request.description,
            comment: request.comment,
            rule_type: request.rule_type,
            users,
        };
        store.groups.push(group.clone());
        Ok(group)
    }

    async fn update_group(
        &self,
        id: EntityId,
        request: ApprovalGroupRequest,
    ) -> ApiResult<ApprovalGroup> {
        self.mutation(&self.update_calls, "update_group").await;
        let mut store = self.store();
        let users = resolve_users(&store, &request.user_ids)?;
        let group = store
            .groups
            .iter_mut()
            .find(|group| group.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("Approval group {}", id)))?;
        group.name = request.name;
        group.description = request.description;
        group.comment = request.comment;
        group.rule_type = request.rule_type;
        group.users = users;
        Ok(group.clone())
    }
}

#[async_trait]
impl CircuitApi for MemoryBackend {
    async fn circuit_code_available(
        &self,
        code: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        self.probe().await;
        Ok(!self
            .store()
            .circuits
            .iter()
            .any(|circuit| Some(circuit.id) != exclude_id && same_code(&circuit.code, code)))
    }

    async fn create_circuit(&self, request: CircuitRequest) -> ApiResult<Circuit> {
        self.mutation(&self.create_calls, "create_circuit").await;
        let mut store = self.store();
        if store.circuits.iter().any(|c| same_code(&c.code, &request.code)) {
            return Err(ApiError::Conflict(format!(
                "Circuit code '{}' is already used",
                request.code
            )));
        }
        let circuit = Circuit {
            id: store.allocate_id(),
            code: request.code,
            title: request.title,
            descriptif: request.descriptif,
            document_type_id: request.document_type_id,
            is_active: request.is_active,
            has_ordered_flow: request.has_ordered_flow,
            allow_backward_step: request.allow_backward_step.unwrap_or(false),
            allow_skip_step: request.allow_skip_step.unwrap_or(false),
        };
        store.circuits.push(circuit.clone());
        Ok(circuit)
    }

    async fn update_circuit(&self, id: EntityId, request: CircuitRequest) -> ApiResult<Circuit> {
        self.mutation(&self.update_calls, "update_circuit").await;
        let mut store = self.store();
        let circuit = store
            .circuits
            .iter_mut()
            .find(|circuit| circuit.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("Circuit {}", id)))?;
        circuit.code = request.code;
        circuit.title = request.title;
        circuit.descriptif = request.descriptif;
        circuit.document_type_id = request.document_type_id;
        circuit.is_active = request.is_active;
        circuit.has_ordered_flow = request.has_ordered_flow;
        circuit.allow_backward_step = request.allow_backward_step.unwrap_or(false);
        circuit.allow_skip_step = request.allow_skip_step.unwrap_or(false);
        Ok(circuit.clone())
    }
}

#[async_trait]
impl LineApi for MemoryBackend {
    async fn list_elements(&self, element_type: ElementType) -> ApiResult<Vec<Element>> {
        self.delay().await;
        Ok(self
            .store()
            .elements
            .get(element_key(element_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_locations(&self) -> ApiResult<Vec<Location>> {
        self.delay().await;
        Ok(self.store().locations.clone())
    }

    async fn list_line_codes(&self, document_id: EntityId) -> ApiResult<Vec<String>> {
        self.delay().await;
        Ok(self
            .store()
            .lines
            .iter()
            .filter(|line| line.document_id == document_id)
            .map(|line| line.code.clone())
            .collect())
    }

    async fn create_line(&self, request: LigneRequest) -> ApiResult<Ligne> {
        self.mutation(&self.create_calls, "create_line").await;
        let mut store = self.store();
        if store
            .lines
            .iter()
            .any(|line| line.document_id == request.document_id && same_code(&line.code, &request.code))
        {
            return Err(ApiError::Conflict(format!(
                "Line code '{}' already exists on this document",
                request.code
            )));
        }
        let line = Ligne {
            id: store.allocate_id(),
            document_id: request.document_id,
            code: request.code,
            description: request.description,
            element_type: request.element_type,
            element_id: request.element_id,
            location_id: request.location_id,
            quantity: request.quantity,
            unit_price: request.unit_price,
            discount_percentage: request.discount_percentage,
            discount_amount: request.discount_amount,
            vat_percentage: request.vat_percentage,
        };
        store.lines.push(line.clone());
        Ok(line)
    }

    async fn update_line(&self, id: EntityId, request: LigneRequest) -> ApiResult<Ligne> {
        self.mutation(&self.update_calls, "update_line").await;
        let mut store = self.store();
        let line = store
            .lines
            .iter_mut()
            .find(|line| line.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("Line {}", id)))?;
        *line = Ligne {
            id,
            document_id: request.document_id,
            code: request.code,
            description: request.description,
            element_type: request.element_type,
            element_id: request.element_id,
            location_id: request.location_id,
            quantity: request.quantity,
            unit_price: request.unit_price,
            discount_percentage: request.discount_percentage,
            discount_amount: request.discount_amount,
            vat_percentage: request.vat_percentage,
        };
        Ok(line.clone())
    }
}

#[async_trait]
impl AccountApi for MemoryBackend {
    async fn account_code_available(
        &self,
        code: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        self.probe().await;
        Ok(!self
            .store()
            .accounts
            .iter()
            .any(|account| Some(account.id) != exclude_id && same_code(&account.code, code)))
    }

    async fn create_account(&self, request: GeneralAccountRequest) -> ApiResult<GeneralAccount> {
        self.mutation(&self.create_calls, "create_account").await;
        let mut store = self.store();
        if store.accounts.iter().any(|a| same_code(&a.code, &request.code)) {
            return Err(ApiError::Conflict(format!(
                "Account code '{}' is already used",
                request.code
            )));
        }
        let account = GeneralAccount {
            id: store.allocate_id(),
            code: request.code,
            description: request.description,
            account_type: request.account_type,
            lettrable: request.lettrable,
            is_active: request.is_active,
        };
        store.accounts.push(account.clone());
        Ok(account)
    }

    async fn update_account(
        &self,
        id: EntityId,
        request: GeneralAccountRequest,
    ) -> ApiResult<GeneralAccount> {
        self.mutation(&self.update_calls, "update_account").await;
        let mut store = self.store();
        let account = store
            .accounts
            .iter_mut()
            .find(|account| account.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("Account {}", id)))?;
        account.code = request.code;
        account.description = request.description;
        account.account_type = request.account_type;
        account.lettrable = request.lettrable;
        account.is_active = request.is_active;
        Ok(account.clone())
    }
}

#[async_trait]
impl SubTypeApi for MemoryBackend {
    async fn sub_type_prefix_available(
        &self,
        document_type_id: EntityId,
        prefix: &str,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        self.probe().await;
        Ok(!self.store().sub_types.iter().any(|sub_type| {
            sub_type.document_type_id == document_type_id
                && Some(sub_type.id) != exclude_id
                && same_code(&sub_type.prefix, prefix)
        }))
    }

    async fn check_overlap(
        &self,
        document_type_id: EntityId,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: Option<EntityId>,
    ) -> ApiResult<OverlapCheck> {
        self.probe().await;
        let store = self.store();
        Ok(store
            .sub_types
            .iter()
            .find(|sub_type| {
                sub_type.document_type_id == document_type_id
                    && Some(sub_type.id) != exclude_id
                    && sub_type.overlaps(start, end)
            })
            .cloned()
            .map(OverlapCheck::conflict)
            .unwrap_or_else(OverlapCheck::clear))
    }

    async fn create_sub_type(&self, request: SubTypeRequest) -> ApiResult<SubType> {
        self.mutation(&self.create_calls, "create_sub_type").await;
        let mut store = self.store();
        if let Some(existing) = store.sub_types.iter().find(|sub_type| {
            sub_type.document_type_id == request.document_type_id
                && sub_type.overlaps(request.start_date, request.end_date)
        }) {
            return Err(ApiError::Conflict(format!(
                "Period overlaps with '{}'",
                existing.name
            )));
        }
        let sub_type = SubType {
            id: store.allocate_id(),
            document_type_id: request.document_type_id,
            prefix: request.prefix,
            name: request.name,
            description: request.description,
            start_date: request.start_date,
            end_date: request.end_date,
            is_active: request.is_active,
        };
        store.sub_types.push(sub_type.clone());
        Ok(sub_type)
    }

    async fn update_sub_type(&self, id: EntityId, request: SubTypeRequest) -> ApiResult<SubType> {
        self.mutation(&self.update_calls, "update_sub_type").await;
        let mut store = self.store();
        let sub_type = store
            .sub_types
            .iter_mut()
            .find(|sub_type| sub_type.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("Sub-type {}", id)))?;
        sub_type.document_type_id = request.document_type_id;
        sub_type.prefix = request.prefix;
        sub_type.name = request.name;
        sub_type.description = request.description;
        sub_type.start_date = request.start_date;
        sub_type.end_date = request.end_date;
        sub_type.is_active = request.is_active;
        Ok(sub_type.clone())
    }
}

#[async_trait]
impl RegistrationApi for MemoryBackend {
    async fn username_available(&self, username: &str) -> ApiResult<bool> {
        self.probe().await;
        let store = self.store();
        Ok(!store.users.iter().any(|user| same_code(&user.username, username))
            && !store.registered.iter().any(|user| same_code(&user.username, username)))
    }

    async fn email_available(&self, email: &str) -> ApiResult<bool> {
        self.probe().await;
        let store = self.store();
        let in_users = store
            .users
            .iter()
            .filter_map(|user| user.email.as_deref())
            .any(|existing| same_code(existing, email));
        Ok(!in_users && !store.registered.iter().any(|user| same_code(&user.email, email)))
    }

    async fn register(&self, request: RegistrationRequest) -> ApiResult<RegisteredUser> {
        self.mutation(&self.create_calls, "register").await;
        let mut store = self.store();
        if store
            .registered
            .iter()
            .any(|user| same_code(&user.username, &request.username))
        {
            return Err(ApiError::Conflict(format!(
                "Username '{}' is already taken",
                request.username
            )));
        }
        let user = RegisteredUser {
            id: store.allocate_id(),
            username: request.username,
            email: request.email,
        };
        store.registered.push(user.clone());
        Ok(user)
    }
}
