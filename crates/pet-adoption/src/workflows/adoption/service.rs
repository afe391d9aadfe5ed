use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::access::Caller;
use super::domain::{
    AdoptionRequest, CommitmentInput, HandoffInput, HomeVisitInput, InterviewInput, ProcessId,
    RequestId, RequestStatus, Stage, UnknownStage, UserId,
};
use super::process::{AdoptionProcess, Approval, TransitionError};
use super::repository::{
    AdopterNotification, AdoptionRepository, NotificationPublisher, NotificationTemplate,
    ProcessCommit, RepositoryError,
};
use super::uploads::{
    CommitmentStorage, CommitmentUpload, StorageError, UploadPolicy, UploadRejection,
};
use super::views::{ProcessView, RequestView};

/// Service driving adoption processes through their four stages.
pub struct AdoptionProcessService<R, N, S> {
    repository: Arc<R>,
    notifications: Arc<N>,
    storage: Arc<S>,
    uploads: UploadPolicy,
}

static PROCESS_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_process_id() -> ProcessId {
    let id = PROCESS_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ProcessId(format!("proc-{id:06}"))
}

/// Outcome of an approval call as reported back to the administrator.
#[derive(Debug, Clone)]
pub struct ApprovalReceipt {
    pub process: AdoptionProcess,
    pub stage: Stage,
    pub approval: Approval,
}

impl ApprovalReceipt {
    pub fn finalized(&self) -> bool {
        self.process.finalized
    }

    pub fn message(&self) -> String {
        match self.approval {
            Approval::Finalized => format!(
                "stage {} approved, adoption process finalized",
                self.stage
            ),
            Approval::Recorded => format!("stage {} approved", self.stage),
            Approval::Unchanged => format!("stage {} was already approved", self.stage),
        }
    }
}

impl<R, N, S> AdoptionProcessService<R, N, S>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    pub fn new(repository: Arc<R>, notifications: Arc<N>, storage: Arc<S>) -> Self {
        Self::with_upload_policy(repository, notifications, storage, UploadPolicy::default())
    }

    pub fn with_upload_policy(
        repository: Arc<R>,
        notifications: Arc<N>,
        storage: Arc<S>,
        uploads: UploadPolicy,
    ) -> Self {
        Self {
            repository,
            notifications,
            storage,
            uploads,
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        self.uploads
    }

    /// Open a process for a pending request, moving the request to `in_process`.
    pub fn start(&self, request_id: &RequestId) -> Result<AdoptionProcess, ProcessError> {
        let mut request = self.load_request(request_id)?;
        if request.status != RequestStatus::Pending {
            return Err(ProcessError::InvalidState(format!(
                "adoption request {} is {}, only pending requests can start a process",
                request.id.0,
                request.status.label()
            )));
        }

        let now = Utc::now();
        request.status = RequestStatus::InProcess;
        request.updated_at = now;

        let process = AdoptionProcess::new(next_process_id(), request.id.clone(), now);
        let stored = self
            .repository
            .insert(ProcessCommit::process_only(process).with_request(request.clone()))?;

        info!(
            process_id = %stored.id.0,
            request_id = %request.id.0,
            "adoption process started"
        );

        let mut details = BTreeMap::new();
        details.insert("request_id".to_string(), request.id.0.clone());
        details.insert("pet_id".to_string(), request.pet_id.0.clone());
        self.notify(
            NotificationTemplate::ProcessStarted,
            &request.adopter_id,
            &stored.id,
            details,
        );

        Ok(stored)
    }

    pub fn record_interview(
        &self,
        process_id: &ProcessId,
        input: InterviewInput,
    ) -> Result<AdoptionProcess, ProcessError> {
        self.record(process_id, Stage::Interview, |process| {
            process.record_interview(input.into(), Utc::now())
        })
    }

    pub fn record_home_visit(
        &self,
        process_id: &ProcessId,
        input: HomeVisitInput,
    ) -> Result<AdoptionProcess, ProcessError> {
        self.record(process_id, Stage::HomeVisit, |process| {
            process.record_home_visit(input.into(), Utc::now())
        })
    }

    pub fn record_commitment(
        &self,
        process_id: &ProcessId,
        input: CommitmentInput,
    ) -> Result<AdoptionProcess, ProcessError> {
        self.record(process_id, Stage::Commitment, |process| {
            process.record_commitment(input.into(), Utc::now())
        })
    }

    /// Record the hand-off and let the adopter know it is confirmed.
    pub fn record_handoff(
        &self,
        process_id: &ProcessId,
        input: HandoffInput,
    ) -> Result<AdoptionProcess, ProcessError> {
        let mut process = self.load(process_id)?;
        let request = self.load_request(&process.request_id)?;

        process.record_handoff(input.into(), Utc::now())?;
        self.repository
            .commit(ProcessCommit::process_only(process.clone()))?;
        debug!(process_id = %process.id.0, stage = %Stage::Handoff, "stage data recorded");

        let mut details = BTreeMap::new();
        if let Some(at) = process.handoff.handed_over_at {
            details.insert("handed_over_at".to_string(), at.to_rfc3339());
        }
        if let Some(received_by) = &process.handoff.received_by {
            details.insert("received_by".to_string(), received_by.clone());
        }
        self.notify(
            NotificationTemplate::HandoffConfirmed,
            &request.adopter_id,
            &process.id,
            details,
        );

        Ok(process)
    }

    /// Store the adopter's signed commitment. An administrator approves it later.
    pub fn submit_commitment(
        &self,
        caller: &Caller,
        process_id: &ProcessId,
        upload: Option<CommitmentUpload>,
    ) -> Result<AdoptionProcess, ProcessError> {
        let upload = upload.ok_or(UploadRejection::Missing)?;
        let format = self.uploads.validate(&upload)?;

        let mut process = self.load(process_id)?;
        let request = self.load_request(&process.request_id)?;
        if !caller.role.is_staff() && !request.is_owned_by(&caller.user_id) {
            return Err(ProcessError::Forbidden(
                "only the adopter of this request may submit the commitment".to_string(),
            ));
        }
        process.ensure_open()?;

        let reference = self.storage.store(&process.id, format, &upload.bytes)?;
        let saved = process
            .attach_signed_commitment(reference.clone(), Utc::now())
            .map_err(ProcessError::from)
            .and_then(|()| {
                self.repository
                    .commit(ProcessCommit::process_only(process.clone()))
                    .map_err(ProcessError::from)
            });
        if let Err(err) = saved {
            if let Err(cleanup) = self.storage.discard(&reference) {
                warn!(
                    process_id = %process.id.0,
                    error = %cleanup,
                    "stored commitment could not be discarded"
                );
            }
            return Err(err);
        }

        info!(
            process_id = %process.id.0,
            bytes = upload.bytes.len(),
            format = format.extension(),
            "signed commitment received"
        );
        Ok(process)
    }

    /// Approve a stage; the fourth approval finalizes the process and its request.
    pub fn approve(
        &self,
        process_id: &ProcessId,
        stage: Stage,
    ) -> Result<ApprovalReceipt, ProcessError> {
        let mut process = self.load(process_id)?;
        let approval = process.approve(stage, Utc::now())?;

        match approval {
            Approval::Unchanged => {
                debug!(process_id = %process.id.0, %stage, "stage already approved");
            }
            Approval::Recorded => {
                self.repository
                    .commit(ProcessCommit::process_only(process.clone()))?;
                info!(process_id = %process.id.0, %stage, "stage approved");
            }
            Approval::Finalized => self.complete(&process, stage)?,
        }

        Ok(ApprovalReceipt {
            process,
            stage,
            approval,
        })
    }

    /// Reject a stage. The process and its request close as rejected.
    pub fn reject(
        &self,
        process_id: &ProcessId,
        stage: Stage,
        reason: &str,
    ) -> Result<AdoptionProcess, ProcessError> {
        let mut process = self.load(process_id)?;
        let mut request = self.load_request(&process.request_id)?;

        let now = Utc::now();
        process.reject(stage, reason, now)?;
        request.status = RequestStatus::Rejected;
        request.updated_at = now;

        self.repository
            .commit(ProcessCommit::process_only(process.clone()).with_request(request.clone()))?;

        info!(
            process_id = %process.id.0,
            request_id = %request.id.0,
            %stage,
            "adoption process rejected"
        );

        let mut details = BTreeMap::new();
        details.insert("stage".to_string(), stage.code().to_string());
        details.insert(
            "reason".to_string(),
            process.rejection_reason.clone().unwrap_or_default(),
        );
        self.notify(
            NotificationTemplate::ProcessRejected,
            &request.adopter_id,
            &process.id,
            details,
        );

        Ok(process)
    }

    pub fn get(
        &self,
        caller: &Caller,
        process_id: &ProcessId,
    ) -> Result<ProcessView, ProcessError> {
        let process = self.load(process_id)?;
        self.authorized_view(caller, process)
    }

    pub fn get_by_request(
        &self,
        caller: &Caller,
        request_id: &RequestId,
    ) -> Result<ProcessView, ProcessError> {
        let process = self
            .repository
            .fetch_by_request(request_id)?
            .ok_or_else(|| {
                ProcessError::NotFound(format!("adoption process for request {}", request_id.0))
            })?;
        self.authorized_view(caller, process)
    }

    pub fn list(&self) -> Result<Vec<ProcessView>, ProcessError> {
        self.repository
            .list()?
            .into_iter()
            .map(|process| {
                let request = self.repository.request(&process.request_id)?;
                self.expand(process, request)
            })
            .collect()
    }

    /// Processes whose request belongs to `adopter_id`.
    pub fn list_for_adopter(&self, adopter_id: &UserId) -> Result<Vec<ProcessView>, ProcessError> {
        let mut views = Vec::new();
        for process in self.repository.list()? {
            let Some(request) = self.repository.request(&process.request_id)? else {
                continue;
            };
            if request.is_owned_by(adopter_id) {
                views.push(self.expand(process, Some(request))?);
            }
        }
        Ok(views)
    }

    fn complete(&self, process: &AdoptionProcess, stage: Stage) -> Result<(), ProcessError> {
        let mut request = self.load_request(&process.request_id)?;
        request.status = RequestStatus::Finalized;
        request.updated_at = process.updated_at;

        let mut commit =
            ProcessCommit::process_only(process.clone()).with_request(request.clone());
        match self.repository.pet(&request.pet_id)? {
            Some(mut pet) => {
                pet.available = false;
                commit = commit.with_pet(pet);
            }
            None => warn!(
                pet_id = %request.pet_id.0,
                process_id = %process.id.0,
                "pet not found, availability left untouched"
            ),
        }
        self.repository.commit(commit)?;

        info!(
            process_id = %process.id.0,
            request_id = %request.id.0,
            %stage,
            "adoption process finalized"
        );

        let mut details = BTreeMap::new();
        details.insert("request_id".to_string(), request.id.0.clone());
        details.insert("pet_id".to_string(), request.pet_id.0.clone());
        self.notify(
            NotificationTemplate::ProcessCompleted,
            &request.adopter_id,
            &process.id,
            details,
        );
        Ok(())
    }

    fn record<F>(
        &self,
        process_id: &ProcessId,
        stage: Stage,
        apply: F,
    ) -> Result<AdoptionProcess, ProcessError>
    where
        F: FnOnce(&mut AdoptionProcess) -> Result<(), TransitionError>,
    {
        let mut process = self.load(process_id)?;
        apply(&mut process)?;
        self.repository
            .commit(ProcessCommit::process_only(process.clone()))?;
        debug!(process_id = %process.id.0, %stage, "stage data recorded");
        Ok(process)
    }

    fn authorized_view(
        &self,
        caller: &Caller,
        process: AdoptionProcess,
    ) -> Result<ProcessView, ProcessError> {
        let request = self.repository.request(&process.request_id)?;
        if !caller.role.is_staff() {
            match &request {
                Some(request) => caller.ensure_can_view(request)?,
                None => {
                    return Err(ProcessError::Forbidden(
                        "adoption request is no longer available".to_string(),
                    ))
                }
            }
        }
        self.expand(process, request)
    }

    fn expand(
        &self,
        process: AdoptionProcess,
        request: Option<AdoptionRequest>,
    ) -> Result<ProcessView, ProcessError> {
        let request = match request {
            Some(request) => {
                let pet = self.repository.pet(&request.pet_id)?;
                let adopter = self.repository.adopter(&request.adopter_id)?;
                Some(RequestView::new(request, pet, adopter))
            }
            None => None,
        };
        Ok(ProcessView::new(process, request))
    }

    fn load(&self, process_id: &ProcessId) -> Result<AdoptionProcess, ProcessError> {
        self.repository
            .fetch(process_id)?
            .ok_or_else(|| ProcessError::NotFound(format!("adoption process {}", process_id.0)))
    }

    fn load_request(&self, request_id: &RequestId) -> Result<AdoptionRequest, ProcessError> {
        self.repository
            .request(request_id)?
            .ok_or_else(|| ProcessError::NotFound(format!("adoption request {}", request_id.0)))
    }

    /// Notifications never fail the workflow; errors are logged and dropped.
    fn notify(
        &self,
        template: NotificationTemplate,
        adopter_id: &UserId,
        process_id: &ProcessId,
        details: BTreeMap<String, String>,
    ) {
        let notification = AdopterNotification {
            template,
            adopter_id: adopter_id.clone(),
            process_id: process_id.clone(),
            details,
        };
        if let Err(err) = self.notifications.publish(notification) {
            warn!(
                process_id = %process_id.0,
                template = template.label(),
                error = %err,
                "adopter notification failed"
            );
        }
    }
}

/// Error raised by the adoption process service.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{0}")]
    InvalidState(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("authentication required: {0}")]
    Unauthenticated(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<TransitionError> for ProcessError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::AlreadyFinalized { .. } => Self::InvalidState(value.to_string()),
            TransitionError::MissingReason => Self::InvalidArgument(value.to_string()),
        }
    }
}

impl From<UnknownStage> for ProcessError {
    fn from(value: UnknownStage) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<UploadRejection> for ProcessError {
    fn from(value: UploadRejection) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<StorageError> for ProcessError {
    fn from(value: StorageError) -> Self {
        Self::Upstream(value.to_string())
    }
}
