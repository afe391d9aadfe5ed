//! Adoption process workflow: interview, home visit, signed commitment and hand-off.
//!
//! An administrator opens a process for a pending adoption request, records and
//! approves each stage, and the process finalizes once all four stages are
//! approved. A rejection at any stage closes the process and the request.

pub mod access;
pub mod domain;
pub mod process;
pub mod repository;
pub mod router;
pub mod service;
pub mod uploads;
pub mod views;

#[cfg(test)]
mod tests;

pub use access::{Caller, Role};
pub use domain::{
    AdopterProfile, AdoptionRequest, CommitmentInput, CommitmentStage, HandoffInput, HandoffStage,
    HomeVisitInput, HomeVisitStage, InterviewInput, InterviewStage, PetId, PetRecord, ProcessId,
    RequestId, RequestStatus, Stage, UnknownStage, UserId,
};
pub use process::{AdoptionProcess, Approval, ProcessOutcome, TransitionError};
pub use repository::{
    AdopterNotification, AdoptionRepository, NotificationError, NotificationPublisher,
    NotificationTemplate, ProcessCommit, RepositoryError,
};
pub use router::process_router;
pub use service::{AdoptionProcessService, ApprovalReceipt, ProcessError};
pub use uploads::{
    CommitmentStorage, CommitmentUpload, ImageFormat, StorageError, UploadPolicy, UploadRejection,
};
pub use views::{ProcessView, RequestView};
