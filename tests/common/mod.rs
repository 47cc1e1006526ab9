#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docflow_wizards::{
    api::ApprovalApi,
    domain::{ApprovalGroup, ApprovalGroupRequest, EntityId, User},
    errors::{ApiError, ApiResult},
    wizard::{FieldValue, OptionItem},
};

pub fn users() -> Vec<User> {
    vec![
        User::new(1, "amartin").with_names("Alice", "Martin"),
        User::new(2, "bdupont").with_names("Bruno", "Dupont"),
        User::new(3, "cbernard").with_names("Chloe", "Bernard"),
        User::new(4, "dpetit").with_names("David", "Petit"),
    ]
}

pub fn selection(users: &[&User]) -> FieldValue {
    FieldValue::Selection(
        users
            .iter()
            .map(|user| OptionItem::new(user.id, user.full_name()))
            .collect(),
    )
}

#[derive(Debug, Clone, Copy)]
pub struct NameProbe {
    pub available: bool,
    pub latency: Duration,
}

/// Approval service double that records every request it receives.
///
/// Name probes answer per lowercased name with a configurable latency, so
/// tests can make an early request resolve after a later one.
#[derive(Debug, Default)]
pub struct RecordingApprovalApi {
    users: Vec<User>,
    probes: Mutex<HashMap<String, NameProbe>>,
    probe_error: Mutex<Option<ApiError>>,
    failures_left: AtomicUsize,
    create_latency: Mutex<Duration>,
    pub probed: Mutex<Vec<String>>,
    pub created: Mutex<Vec<ApprovalGroupRequest>>,
    pub updated: Mutex<Vec<(EntityId, ApprovalGroupRequest)>>,
    pub create_calls: AtomicUsize,
}

impl RecordingApprovalApi {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users,
            ..Self::default()
        }
    }

    pub fn with_name(self, name: &str, available: bool, latency: Duration) -> Self {
        self.probes
            .lock()
            .unwrap()
            .insert(name.to_lowercase(), NameProbe { available, latency });
        self
    }

    pub fn with_probe_error(self, error: ApiError) -> Self {
        *self.probe_error.lock().unwrap() = Some(error);
        self
    }

    /// The next `count` create/update calls fail with a transport error.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_create_latency(self, latency: Duration) -> Self {
        *self.create_latency.lock().unwrap() = latency;
        self
    }

    pub fn created(&self) -> Vec<ApprovalGroupRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    fn take_failure(&self) -> Option<ApiError> {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .ok()
            .map(|_| ApiError::Transport("connection reset".into()))
    }

    fn group(&self, id: EntityId, request: &ApprovalGroupRequest) -> ApprovalGroup {
        ApprovalGroup {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            comment: request.comment.clone(),
            rule_type: request.rule_type,
            users: request
                .user_ids
                .iter()
                .filter_map(|id| self.users.iter().find(|user| user.id == *id).cloned())
                .collect(),
        }
    }
}

#[async_trait]
impl ApprovalApi for RecordingApprovalApi {
    async fn list_eligible_approvers(
        &self,
        _exclude_group: Option<EntityId>,
    ) -> ApiResult<Vec<User>> {
        Ok(self.users.clone())
    }

    async fn group_name_available(
        &self,
        name: &str,
        _exclude_id: Option<EntityId>,
    ) -> ApiResult<bool> {
        self.probed.lock().unwrap().push(name.to_string());
        let probe = self
            .probes
            .lock()
            .unwrap()
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(NameProbe {
                available: true,
                latency: Duration::ZERO,
            });
        tokio::time::sleep(probe.latency).await;
        if let Some(error) = self.probe_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(probe.available)
    }

    async fn create_group(&self, request: ApprovalGroupRequest) -> ApiResult<ApprovalGroup> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.create_latency.lock().unwrap();
        tokio::time::sleep(latency).await;
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.created.lock().unwrap().push(request.clone());
        Ok(self.group(900, &request))
    }

    async fn update_group(
        &self,
        id: EntityId,
        request: ApprovalGroupRequest,
    ) -> ApiResult<ApprovalGroup> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.updated.lock().unwrap().push((id, request.clone()));
        Ok(self.group(id, &request))
    }
}
