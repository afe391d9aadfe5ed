use serde::Serialize;

use super::domain::{
    AdopterProfile, AdoptionRequest, PetRecord, RequestId, RequestStatus, Stage, UserId,
};
use super::process::{AdoptionProcess, ProcessOutcome};

/// Process expanded with its request, pet and adopter for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessView {
    #[serde(flatten)]
    pub process: AdoptionProcess,
    pub outcome: ProcessOutcome,
    pub pending_stages: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub id: RequestId,
    pub status: RequestStatus,
    pub adopter_id: UserId,
    pub pet: Option<PetRecord>,
    pub adopter: Option<AdopterProfile>,
}

impl RequestView {
    pub fn new(
        request: AdoptionRequest,
        pet: Option<PetRecord>,
        adopter: Option<AdopterProfile>,
    ) -> Self {
        Self {
            id: request.id,
            status: request.status,
            adopter_id: request.adopter_id,
            pet,
            adopter,
        }
    }
}

impl ProcessView {
    pub fn new(process: AdoptionProcess, request: Option<RequestView>) -> Self {
        Self {
            outcome: process.outcome(),
            pending_stages: process.pending_stages(),
            process,
            request,
        }
    }
}
