use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier wrapper for adoption processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub String);

/// Identifier wrapper for adoption requests (solicitudes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PetId(pub String);

/// Marketplace user id. Adopters and administrators share the same id space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Coarse status of an adoption request, independent of the process stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProcess,
    Finalized,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProcess => "in_process",
            RequestStatus::Finalized => "finalized",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// An adopter's application for a specific pet, owned by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptionRequest {
    pub id: RequestId,
    pub pet_id: PetId,
    pub adopter_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdoptionRequest {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.adopter_id == user
    }
}

/// Listing data the workflow needs about a pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetRecord {
    pub id: PetId,
    pub name: String,
    pub species: String,
    pub available: bool,
}

/// Contact card of the adopter behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdopterProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// The four fixed stages of an adoption process, in their natural order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "entrevista")]
    Interview,
    #[serde(rename = "visita")]
    HomeVisit,
    #[serde(rename = "compromiso")]
    Commitment,
    #[serde(rename = "entrega")]
    Handoff,
}

impl Stage {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Interview,
            Self::HomeVisit,
            Self::Commitment,
            Self::Handoff,
        ]
    }

    /// Name used in routes and payloads.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Interview => "entrevista",
            Self::HomeVisit => "visita",
            Self::Commitment => "compromiso",
            Self::Handoff => "entrega",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Interview => "Interview",
            Self::HomeVisit => "Home visit",
            Self::Commitment => "Signed commitment",
            Self::Handoff => "Hand-off",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}', expected one of entrevista, visita, compromiso, entrega")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Stage::ordered()
            .into_iter()
            .find(|stage| stage.code() == value)
            .ok_or_else(|| UnknownStage(value.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewStage {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeVisitStage {
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Free-form visit slot as agreed with the adopter (e.g. "10:30").
    pub time: Option<String>,
    pub responsible: Option<String>,
    pub notes: Option<String>,
    pub attended: bool,
    pub approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentStage {
    /// Storage reference of the signed commitment image.
    pub document: Option<String>,
    pub signed: bool,
    pub approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffStage {
    pub handed_over_at: Option<DateTime<Utc>>,
    pub received_by: Option<String>,
    pub notes: Option<String>,
    pub approved: bool,
}

/// Accepts JSON booleans, numbers (non-zero is true) and the yes/no strings
/// sent by form posts. Anything else is rejected rather than read as false.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(f64),
        Text(String),
    }

    let Some(flag) = Option::<Flag>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let value = match flag {
        Flag::Bool(value) => value,
        Flag::Number(number) => number != 0.0,
        Flag::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "si" | "sí" | "on" => true,
            "false" | "0" | "no" | "off" | "" => false,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "`{other}` is not a valid approval flag"
                )))
            }
        },
    };
    Ok(Some(value))
}

/// Interview data as submitted by an administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewInput {
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub approved: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeVisitInput {
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub attended: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub approved: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentInput {
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub signed: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub approved: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffInput {
    #[serde(default)]
    pub handed_over_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub received_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub approved: Option<bool>,
}

impl From<InterviewInput> for InterviewStage {
    fn from(input: InterviewInput) -> Self {
        Self {
            scheduled_at: input.scheduled_at,
            meeting_link: input.meeting_link,
            notes: input.notes,
            approved: input.approved.unwrap_or(false),
        }
    }
}

impl From<HomeVisitInput> for HomeVisitStage {
    fn from(input: HomeVisitInput) -> Self {
        Self {
            scheduled_at: input.scheduled_at,
            time: input.time,
            responsible: input.responsible,
            notes: input.notes,
            attended: input.attended.unwrap_or(false),
            approved: input.approved.unwrap_or(false),
        }
    }
}

impl From<CommitmentInput> for CommitmentStage {
    fn from(input: CommitmentInput) -> Self {
        Self {
            document: input.document,
            signed: input.signed.unwrap_or(false),
            approved: input.approved.unwrap_or(false),
        }
    }
}

impl From<HandoffInput> for HandoffStage {
    fn from(input: HandoffInput) -> Self {
        Self {
            handed_over_at: input.handed_over_at,
            received_by: input.received_by,
            notes: input.notes,
            approved: input.approved.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interview_flag(approved: serde_json::Value) -> Result<Option<bool>, serde_json::Error> {
        serde_json::from_value::<InterviewInput>(json!({ "approved": approved }))
            .map(|input| input.approved)
    }

    #[test]
    fn approval_flag_reads_numbers() {
        assert_eq!(interview_flag(json!(1)).expect("one"), Some(true));
        assert_eq!(interview_flag(json!(0)).expect("zero"), Some(false));
        assert_eq!(interview_flag(json!(2.5)).expect("fraction"), Some(true));
    }

    #[test]
    fn approval_flag_reads_form_strings() {
        assert_eq!(interview_flag(json!(" TRUE ")).expect("true"), Some(true));
        assert_eq!(interview_flag(json!("1")).expect("one"), Some(true));
        assert_eq!(interview_flag(json!("sí")).expect("si"), Some(true));
        assert_eq!(interview_flag(json!("no")).expect("no"), Some(false));
        assert_eq!(interview_flag(json!("")).expect("blank"), Some(false));
    }

    #[test]
    fn approval_flag_rejects_unknown_strings() {
        let err = interview_flag(json!("maybe")).expect_err("unknown flag");
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn approval_flag_may_be_absent_or_null() {
        let input: InterviewInput = serde_json::from_value(json!({})).expect("empty body");
        assert_eq!(input.approved, None);
        assert_eq!(interview_flag(json!(null)).expect("null"), None);
    }
}
