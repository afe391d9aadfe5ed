use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    AdopterProfile, AdoptionRequest, PetId, PetRecord, ProcessId, RequestId, UserId,
};
use super::process::AdoptionProcess;

/// Entities written together in one atomic repository call.
///
/// Finalization touches the process, its request and (on completion) the pet;
/// grouping them keeps the three records consistent even if the caller crashes
/// between writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommit {
    pub process: AdoptionProcess,
    pub request: Option<AdoptionRequest>,
    pub pet: Option<PetRecord>,
}

impl ProcessCommit {
    pub fn process_only(process: AdoptionProcess) -> Self {
        Self {
            process,
            request: None,
            pet: None,
        }
    }

    pub fn with_request(mut self, request: AdoptionRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_pet(mut self, pet: PetRecord) -> Self {
        self.pet = Some(pet);
        self
    }
}

/// Storage abstraction over processes and the marketplace records they reference.
pub trait AdoptionRepository: Send + Sync {
    /// Persist a brand-new process. Fails with `Conflict` when the request
    /// already owns a process.
    fn insert(&self, commit: ProcessCommit) -> Result<AdoptionProcess, RepositoryError>;
    /// Persist every record in the commit atomically.
    fn commit(&self, commit: ProcessCommit) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ProcessId) -> Result<Option<AdoptionProcess>, RepositoryError>;
    fn fetch_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<AdoptionProcess>, RepositoryError>;
    fn list(&self) -> Result<Vec<AdoptionProcess>, RepositoryError>;
    fn request(&self, id: &RequestId) -> Result<Option<AdoptionRequest>, RepositoryError>;
    fn pet(&self, id: &PetId) -> Result<Option<PetRecord>, RepositoryError>;
    fn adopter(&self, id: &UserId) -> Result<Option<AdopterProfile>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook (e-mail, push, in-app inbox).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: AdopterNotification) -> Result<(), NotificationError>;
}

/// Templates the workflow sends to adopters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    ProcessStarted,
    HandoffConfirmed,
    ProcessCompleted,
    ProcessRejected,
}

impl NotificationTemplate {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationTemplate::ProcessStarted => "process_started",
            NotificationTemplate::HandoffConfirmed => "handoff_confirmed",
            NotificationTemplate::ProcessCompleted => "process_completed",
            NotificationTemplate::ProcessRejected => "process_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdopterNotification {
    pub template: NotificationTemplate,
    pub adopter_id: UserId,
    pub process_id: ProcessId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
