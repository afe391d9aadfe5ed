use chrono::{TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use pet_adoption::workflows::adoption::{
    AdopterNotification, AdopterProfile, AdoptionProcess, AdoptionRepository, AdoptionRequest,
    CommitmentStorage, ImageFormat, NotificationError, NotificationPublisher, PetId, PetRecord,
    ProcessCommit, ProcessId, RepositoryError, RequestId, RequestStatus, Stage, StorageError,
    UserId,
};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct StoreRecords {
    processes: HashMap<ProcessId, AdoptionProcess>,
    requests: HashMap<RequestId, AdoptionRequest>,
    pets: HashMap<PetId, PetRecord>,
    adopters: HashMap<UserId, AdopterProfile>,
}

/// Process-local stand-in for the marketplace database. Every commit is
/// applied under one lock so process, request and pet never diverge.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAdoptionStore {
    records: Arc<Mutex<StoreRecords>>,
}

impl InMemoryAdoptionStore {
    pub(crate) fn seeded() -> Self {
        let store = Self::default();
        store.seed_demo();
        store
    }

    /// Three pending requests against three available pets.
    pub(crate) fn seed_demo(&self) {
        let fixtures = [
            ("sol-001", "adoptante-1", "Valentina Pérez", "mascota-1", "Luna", "perro"),
            ("sol-002", "adoptante-2", "Mateo Gómez", "mascota-2", "Milo", "gato"),
            ("sol-003", "adoptante-1", "Valentina Pérez", "mascota-3", "Kira", "perro"),
        ];
        let created = Utc
            .with_ymd_and_hms(2025, 4, 7, 14, 30, 0)
            .single()
            .unwrap_or_else(Utc::now);

        let Ok(mut records) = self.records.lock() else {
            return;
        };
        for (request, adopter, adopter_name, pet, pet_name, species) in fixtures {
            records.requests.insert(
                RequestId(request.to_string()),
                AdoptionRequest {
                    id: RequestId(request.to_string()),
                    pet_id: PetId(pet.to_string()),
                    adopter_id: UserId(adopter.to_string()),
                    status: RequestStatus::Pending,
                    created_at: created,
                    updated_at: created,
                },
            );
            records.pets.insert(
                PetId(pet.to_string()),
                PetRecord {
                    id: PetId(pet.to_string()),
                    name: pet_name.to_string(),
                    species: species.to_string(),
                    available: true,
                },
            );
            records.adopters.insert(
                UserId(adopter.to_string()),
                AdopterProfile {
                    id: UserId(adopter.to_string()),
                    name: adopter_name.to_string(),
                    email: format!("{adopter}@adopciones.example"),
                },
            );
        }
        debug!(requests = records.requests.len(), "demo adoption requests seeded");
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreRecords>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("adoption store lock poisoned".to_string()))
    }

    fn apply(records: &mut StoreRecords, commit: ProcessCommit) {
        if let Some(request) = commit.request {
            records.requests.insert(request.id.clone(), request);
        }
        if let Some(pet) = commit.pet {
            records.pets.insert(pet.id.clone(), pet);
        }
        records
            .processes
            .insert(commit.process.id.clone(), commit.process);
    }
}

impl AdoptionRepository for InMemoryAdoptionStore {
    fn insert(&self, commit: ProcessCommit) -> Result<AdoptionProcess, RepositoryError> {
        let mut records = self.lock()?;
        if records
            .processes
            .values()
            .any(|process| process.request_id == commit.process.request_id)
        {
            return Err(RepositoryError::Conflict);
        }
        let process = commit.process.clone();
        Self::apply(&mut records, commit);
        Ok(process)
    }

    fn commit(&self, commit: ProcessCommit) -> Result<(), RepositoryError> {
        let mut records = self.lock()?;
        if !records.processes.contains_key(&commit.process.id) {
            return Err(RepositoryError::NotFound);
        }
        Self::apply(&mut records, commit);
        Ok(())
    }

    fn fetch(&self, id: &ProcessId) -> Result<Option<AdoptionProcess>, RepositoryError> {
        Ok(self.lock()?.processes.get(id).cloned())
    }

    fn fetch_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<AdoptionProcess>, RepositoryError> {
        Ok(self
            .lock()?
            .processes
            .values()
            .find(|process| &process.request_id == request_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<AdoptionProcess>, RepositoryError> {
        let records = self.lock()?;
        let mut processes: Vec<_> = records.processes.values().cloned().collect();
        processes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(processes)
    }

    fn request(&self, id: &RequestId) -> Result<Option<AdoptionRequest>, RepositoryError> {
        Ok(self.lock()?.requests.get(id).cloned())
    }

    fn pet(&self, id: &PetId) -> Result<Option<PetRecord>, RepositoryError> {
        Ok(self.lock()?.pets.get(id).cloned())
    }

    fn adopter(&self, id: &UserId) -> Result<Option<AdopterProfile>, RepositoryError> {
        Ok(self.lock()?.adopters.get(id).cloned())
    }
}

/// Records notifications and mirrors them to the log until a mail transport
/// is wired in.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<AdopterNotification>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notification: AdopterNotification) -> Result<(), NotificationError> {
        info!(
            template = notification.template.label(),
            adopter_id = %notification.adopter_id.0,
            process_id = %notification.process_id.0,
            "adopter notification queued"
        );
        let mut guard = self
            .events
            .lock()
            .map_err(|_| NotificationError::Transport("notification outbox poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<AdopterNotification> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Writes signed commitments below a local directory, one file per process.
#[derive(Debug, Clone)]
pub(crate) struct LocalCommitmentStorage {
    root: PathBuf,
}

impl LocalCommitmentStorage {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CommitmentStorage for LocalCommitmentStorage {
    fn store(
        &self,
        process_id: &ProcessId,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        fs::create_dir_all(&self.root).map_err(|err| {
            StorageError::Backend(format!("{}: {err}", self.root.display()))
        })?;
        let path = self
            .root
            .join(format!("{}.{}", process_id.0, format.extension()));
        fs::write(&path, bytes)
            .map_err(|err| StorageError::Backend(format!("{}: {err}", path.display())))?;
        debug!(path = %path.display(), bytes = bytes.len(), "commitment written");
        Ok(path.display().to_string())
    }

    fn discard(&self, reference: &str) -> Result<(), StorageError> {
        match fs::remove_file(reference) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Backend(format!("{reference}: {err}"))),
        }
    }
}

/// Keeps uploaded commitments in memory; used by the CLI demo.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCommitmentStorage {
    files: Arc<Mutex<HashMap<String, usize>>>,
}

impl CommitmentStorage for InMemoryCommitmentStorage {
    fn store(
        &self,
        process_id: &ProcessId,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let key = format!("memory://compromisos/{}.{}", process_id.0, format.extension());
        let mut guard = self
            .files
            .lock()
            .map_err(|_| StorageError::Backend("commitment store poisoned".to_string()))?;
        guard.insert(key.clone(), bytes.len());
        Ok(key)
    }

    fn discard(&self, reference: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .map_err(|_| StorageError::Backend("commitment store poisoned".to_string()))?
            .remove(reference);
        Ok(())
    }
}

pub(crate) fn parse_stage(raw: &str) -> Result<Stage, String> {
    raw.parse::<Stage>().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_for(request: &str, id: &str) -> AdoptionProcess {
        AdoptionProcess::new(
            ProcessId(id.to_string()),
            RequestId(request.to_string()),
            Utc::now(),
        )
    }

    #[test]
    fn store_refuses_second_process_for_a_request() {
        let store = InMemoryAdoptionStore::seeded();
        store
            .insert(ProcessCommit::process_only(process_for("sol-001", "proc-a")))
            .expect("first insert");

        let err = store
            .insert(ProcessCommit::process_only(process_for("sol-001", "proc-b")))
            .expect_err("duplicate request");
        assert!(matches!(err, RepositoryError::Conflict));
    }

    #[test]
    fn commit_requires_an_existing_process() {
        let store = InMemoryAdoptionStore::seeded();
        let err = store
            .commit(ProcessCommit::process_only(process_for("sol-002", "proc-x")))
            .expect_err("unknown process");
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[test]
    fn local_storage_writes_one_file_per_process() {
        let root = std::env::temp_dir().join(format!(
            "pet-adoption-commitments-{}",
            std::process::id()
        ));
        let storage = LocalCommitmentStorage::new(&root);

        let reference = storage
            .store(&ProcessId("proc-000042".to_string()), ImageFormat::Png, b"\x89PNG")
            .expect("file written");

        assert!(reference.ends_with("proc-000042.png"));
        let written = fs::read(root.join("proc-000042.png")).expect("file readable");
        assert_eq!(written, b"\x89PNG");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn local_storage_discard_removes_the_written_file() {
        let root = std::env::temp_dir().join(format!(
            "pet-adoption-discard-{}",
            std::process::id()
        ));
        let storage = LocalCommitmentStorage::new(&root);
        let reference = storage
            .store(&ProcessId("proc-000007".to_string()), ImageFormat::Jpeg, b"\xFF\xD8\xFF")
            .expect("file written");

        storage.discard(&reference).expect("file removed");
        assert!(!root.join("proc-000007.jpg").exists());
        storage.discard(&reference).expect("missing file is not an error");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn parse_stage_reports_unknown_codes() {
        assert_eq!(parse_stage("visita"), Ok(Stage::HomeVisit));
        assert!(parse_stage("foo").is_err());
    }
}
