use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CommitmentStage, HandoffStage, HomeVisitStage, InterviewStage, ProcessId, RequestId, Stage,
};

/// Four-stage adoption workflow tied to exactly one adoption request.
///
/// Stage records are always present and start out empty and unapproved. The
/// process becomes `finalized` either when every stage is approved or as soon
/// as one stage is rejected; after that the record is an immutable audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptionProcess {
    pub id: ProcessId,
    pub request_id: RequestId,
    pub interview: InterviewStage,
    pub home_visit: HomeVisitStage,
    pub commitment: CommitmentStage,
    pub handoff: HandoffStage,
    pub finalized: bool,
    pub rejected_stage: Option<Stage>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived view over `finalized` and `rejected_stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    Active,
    Completed,
    Rejected,
}

impl ProcessOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            ProcessOutcome::Active => "active",
            ProcessOutcome::Completed => "completed",
            ProcessOutcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of an approval so callers know whether side effects are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// The stage was already approved; nothing changed.
    Unchanged,
    /// The stage is now approved but other stages are still pending.
    Recorded,
    /// This approval completed the fourth stage and finalized the process.
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("process {process} was already finalized as {outcome}")]
    AlreadyFinalized {
        process: String,
        outcome: ProcessOutcome,
    },
    #[error("a rejection reason is required")]
    MissingReason,
}

impl AdoptionProcess {
    pub fn new(id: ProcessId, request_id: RequestId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            request_id,
            interview: InterviewStage::default(),
            home_visit: HomeVisitStage::default(),
            commitment: CommitmentStage::default(),
            handoff: HandoffStage::default(),
            finalized: false,
            rejected_stage: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn outcome(&self) -> ProcessOutcome {
        match (self.finalized, self.rejected_stage) {
            (false, _) => ProcessOutcome::Active,
            (true, Some(_)) => ProcessOutcome::Rejected,
            (true, None) => ProcessOutcome::Completed,
        }
    }

    pub fn is_approved(&self, stage: Stage) -> bool {
        match stage {
            Stage::Interview => self.interview.approved,
            Stage::HomeVisit => self.home_visit.approved,
            Stage::Commitment => self.commitment.approved,
            Stage::Handoff => self.handoff.approved,
        }
    }

    pub fn all_stages_approved(&self) -> bool {
        Stage::ordered()
            .into_iter()
            .all(|stage| self.is_approved(stage))
    }

    /// Stages that still need an administrator's approval.
    pub fn pending_stages(&self) -> Vec<Stage> {
        Stage::ordered()
            .into_iter()
            .filter(|stage| !self.is_approved(*stage))
            .collect()
    }

    pub fn record_interview(
        &mut self,
        stage: InterviewStage,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.interview = stage;
        self.touch(now);
        Ok(())
    }

    pub fn record_home_visit(
        &mut self,
        stage: HomeVisitStage,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.home_visit = stage;
        self.touch(now);
        Ok(())
    }

    pub fn record_commitment(
        &mut self,
        stage: CommitmentStage,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.commitment = stage;
        self.touch(now);
        Ok(())
    }

    /// Attach the adopter's signed document. Approval is left to an administrator.
    pub fn attach_signed_commitment(
        &mut self,
        document: String,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.commitment.document = Some(document);
        self.commitment.signed = true;
        self.commitment.approved = false;
        self.touch(now);
        Ok(())
    }

    pub fn record_handoff(
        &mut self,
        stage: HandoffStage,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.handoff = stage;
        self.touch(now);
        Ok(())
    }

    /// Approve a stage in any order. Finalization is the AND of all four flags.
    ///
    /// Stage data recorded with `approved = true` counts as approved, so the
    /// approval that observes the fourth flag is the one that finalizes.
    pub fn approve(
        &mut self,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> Result<Approval, TransitionError> {
        let already_approved = self.is_approved(stage);
        if self.finalized && already_approved {
            return Ok(Approval::Unchanged);
        }
        self.ensure_open()?;

        self.set_approved(stage, true);
        if self.all_stages_approved() {
            self.finalized = true;
            self.touch(now);
            return Ok(Approval::Finalized);
        }

        if already_approved {
            Ok(Approval::Unchanged)
        } else {
            self.touch(now);
            Ok(Approval::Recorded)
        }
    }

    /// Reject a stage, terminally finalizing the process.
    pub fn reject(
        &mut self,
        stage: Stage,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TransitionError::MissingReason);
        }

        self.set_approved(stage, false);
        self.finalized = true;
        self.rejected_stage = Some(stage);
        self.rejection_reason = Some(reason.to_string());
        self.touch(now);
        Ok(())
    }

    fn set_approved(&mut self, stage: Stage, approved: bool) {
        match stage {
            Stage::Interview => self.interview.approved = approved,
            Stage::HomeVisit => self.home_visit.approved = approved,
            Stage::Commitment => self.commitment.approved = approved,
            Stage::Handoff => self.handoff.approved = approved,
        }
    }

    /// Fails once the process has been finalized either way.
    pub fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.finalized {
            return Err(TransitionError::AlreadyFinalized {
                process: self.id.0.clone(),
                outcome: self.outcome(),
            });
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
