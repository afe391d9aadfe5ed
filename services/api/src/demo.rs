use crate::infra::{
    parse_stage, InMemoryAdoptionStore, InMemoryCommitmentStorage, InMemoryNotificationPublisher,
};
use chrono::{Duration, Utc};
use clap::Args;
use pet_adoption::error::AppError;
use pet_adoption::workflows::adoption::{
    AdoptionProcess, AdoptionProcessService, AdoptionRepository, Caller, CommitmentUpload,
    HandoffInput, HomeVisitInput, InterviewInput, RequestId, Role, Stage,
};
use std::sync::Arc;

/// Smallest byte run the upload check accepts as a PNG.
const DEMO_COMMITMENT: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seeded adoption request to walk through (sol-001, sol-002 or sol-003)
    #[arg(long, default_value = "sol-001")]
    pub(crate) request: String,
    /// Reject the process at this stage (entrevista, visita, compromiso, entrega)
    #[arg(long, value_parser = parse_stage)]
    pub(crate) reject_at: Option<Stage>,
    /// Reason recorded with the rejection
    #[arg(long, default_value = "El hogar no cumple las condiciones acordadas")]
    pub(crate) reason: String,
    /// Print the final process payload as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

type DemoService = AdoptionProcessService<
    InMemoryAdoptionStore,
    InMemoryNotificationPublisher,
    InMemoryCommitmentStorage,
>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        request,
        reject_at,
        reason,
        json,
    } = args;

    let repository = Arc::new(InMemoryAdoptionStore::seeded());
    let notifications = Arc::new(InMemoryNotificationPublisher::default());
    let service = AdoptionProcessService::new(
        repository.clone(),
        notifications.clone(),
        Arc::new(InMemoryCommitmentStorage::default()),
    );
    let staff = Caller::new("coordinacion-1", Role::FoundationAdmin);

    println!("Pet adoption process demo");
    let process = service.start(&RequestId(request))?;
    println!(
        "- Opened {} for request {}",
        process.id.0, process.request_id.0
    );

    let mut process = process;
    for stage in Stage::ordered() {
        process = record_stage(&service, &process, stage)?;
        println!("  {} recorded", stage.label());

        if reject_at == Some(stage) {
            let rejected = service.reject(&process.id, stage, &reason)?;
            println!(
                "  {} rejected: {}",
                stage.label(),
                rejected.rejection_reason.as_deref().unwrap_or_default()
            );
            process = rejected;
            break;
        }

        let receipt = service.approve(&process.id, stage)?;
        println!("  {}", receipt.message());
        process = receipt.process;
    }

    let view = service.get(&staff, &process.id)?;
    println!("- Outcome: {}", view.outcome);
    if let Some(request) = &view.request {
        println!("  Request status: {}", request.status.label());
        if let Some(pet) = &request.pet {
            println!(
                "  Pet {} ({}) available: {}",
                pet.name, pet.species, pet.available
            );
        }
    }
    if let Ok(processes) = repository.list() {
        println!("  Processes on file: {}", processes.len());
    }

    let events = notifications.events();
    if events.is_empty() {
        println!("  Adopter notifications: none dispatched");
    } else {
        println!("  Adopter notifications:");
        for event in events {
            println!(
                "    - template={} -> {} ({})",
                event.template.label(),
                event.adopter_id.0,
                event.process_id.0
            );
        }
    }

    if json {
        match serde_json::to_string_pretty(&view) {
            Ok(payload) => println!("  Process payload:\n{payload}"),
            Err(err) => println!("  Process payload unavailable: {err}"),
        }
    }

    Ok(())
}

fn record_stage(
    service: &DemoService,
    process: &AdoptionProcess,
    stage: Stage,
) -> Result<AdoptionProcess, AppError> {
    let now = Utc::now();
    let recorded = match stage {
        Stage::Interview => service.record_interview(
            &process.id,
            InterviewInput {
                scheduled_at: Some(now + Duration::days(2)),
                meeting_link: Some("https://meet.adopciones.example/entrevista".to_string()),
                notes: Some("Primera conversación con la familia".to_string()),
                approved: None,
            },
        )?,
        Stage::HomeVisit => service.record_home_visit(
            &process.id,
            HomeVisitInput {
                scheduled_at: Some(now + Duration::days(5)),
                time: Some("10:30".to_string()),
                responsible: Some("Voluntaria Ana".to_string()),
                notes: Some("Patio cercado, sin otras mascotas".to_string()),
                attended: Some(true),
                approved: None,
            },
        )?,
        Stage::Commitment => {
            let view = service.get(
                &Caller::new("coordinacion-1", Role::Admin),
                &process.id,
            )?;
            let adopter = view
                .request
                .map(|request| request.adopter_id.0)
                .unwrap_or_default();
            service.submit_commitment(
                &Caller::new(adopter, Role::Adopter),
                &process.id,
                Some(CommitmentUpload {
                    file_name: Some("compromiso-firmado.png".to_string()),
                    content_type: Some("image/png".to_string()),
                    bytes: DEMO_COMMITMENT.to_vec(),
                }),
            )?
        }
        Stage::Handoff => service.record_handoff(
            &process.id,
            HandoffInput {
                handed_over_at: Some(now + Duration::days(10)),
                received_by: Some("Familia adoptante".to_string()),
                notes: Some("Entrega con cartilla de vacunación".to_string()),
                approved: None,
            },
        )?,
    };
    Ok(recorded)
}
