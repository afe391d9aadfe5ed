use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::adoption::access::{Caller, Role};
use crate::workflows::adoption::domain::{
    AdopterProfile, AdoptionRequest, PetId, PetRecord, ProcessId, RequestId, RequestStatus,
    UserId,
};
use crate::workflows::adoption::process::AdoptionProcess;
use crate::workflows::adoption::repository::{
    AdopterNotification, AdoptionRepository, NotificationError, NotificationPublisher,
    NotificationTemplate, ProcessCommit, RepositoryError,
};
use crate::workflows::adoption::uploads::{CommitmentStorage, ImageFormat, StorageError};
use crate::workflows::adoption::{process_router, AdoptionProcessService};

pub(super) const ADOPTER_A: &str = "adopter-a";
pub(super) const ADOPTER_B: &str = "adopter-b";
pub(super) const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

#[derive(Default)]
pub(super) struct Store {
    pub(super) processes: HashMap<ProcessId, AdoptionProcess>,
    pub(super) requests: HashMap<RequestId, AdoptionRequest>,
    pub(super) pets: HashMap<PetId, PetRecord>,
    pub(super) adopters: HashMap<UserId, AdopterProfile>,
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) store: Arc<Mutex<Store>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryRepository {
    /// Make every later `commit` fail as if the database went away.
    pub(super) fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    pub(super) fn seed_request(&self, request_id: &str, adopter: &str, pet: &str) {
        let created = Utc
            .with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        let mut store = self.store.lock().expect("repository mutex poisoned");
        store.requests.insert(
            RequestId(request_id.to_string()),
            AdoptionRequest {
                id: RequestId(request_id.to_string()),
                pet_id: PetId(pet.to_string()),
                adopter_id: UserId(adopter.to_string()),
                status: RequestStatus::Pending,
                created_at: created,
                updated_at: created,
            },
        );
        store.pets.insert(
            PetId(pet.to_string()),
            PetRecord {
                id: PetId(pet.to_string()),
                name: format!("Luna {pet}"),
                species: "perro".to_string(),
                available: true,
            },
        );
        store.adopters.insert(
            UserId(adopter.to_string()),
            AdopterProfile {
                id: UserId(adopter.to_string()),
                name: format!("Adoptante {adopter}"),
                email: format!("{adopter}@example.org"),
            },
        );
    }

    pub(super) fn request_status(&self, request_id: &str) -> RequestStatus {
        let store = self.store.lock().expect("repository mutex poisoned");
        store
            .requests
            .get(&RequestId(request_id.to_string()))
            .map(|request| request.status)
            .expect("request seeded")
    }

    pub(super) fn pet_available(&self, pet: &str) -> bool {
        let store = self.store.lock().expect("repository mutex poisoned");
        store
            .pets
            .get(&PetId(pet.to_string()))
            .map(|pet| pet.available)
            .expect("pet seeded")
    }

    pub(super) fn list_len(&self) -> usize {
        let store = self.store.lock().expect("repository mutex poisoned");
        store.processes.len()
    }

    pub(super) fn stored_process(&self, id: &ProcessId) -> AdoptionProcess {
        let store = self.store.lock().expect("repository mutex poisoned");
        store.processes.get(id).cloned().expect("process stored")
    }

    fn apply(store: &mut Store, commit: ProcessCommit) {
        if let Some(request) = commit.request {
            store.requests.insert(request.id.clone(), request);
        }
        if let Some(pet) = commit.pet {
            store.pets.insert(pet.id.clone(), pet);
        }
        store
            .processes
            .insert(commit.process.id.clone(), commit.process);
    }
}

impl AdoptionRepository for MemoryRepository {
    fn insert(&self, commit: ProcessCommit) -> Result<AdoptionProcess, RepositoryError> {
        let mut store = self.store.lock().expect("repository mutex poisoned");
        let duplicate = store
            .processes
            .values()
            .any(|existing| existing.request_id == commit.process.request_id);
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        let process = commit.process.clone();
        Self::apply(&mut store, commit);
        Ok(process)
    }

    fn commit(&self, commit: ProcessCommit) -> Result<(), RepositoryError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        let mut store = self.store.lock().expect("repository mutex poisoned");
        if !store.processes.contains_key(&commit.process.id) {
            return Err(RepositoryError::NotFound);
        }
        Self::apply(&mut store, commit);
        Ok(())
    }

    fn fetch(&self, id: &ProcessId) -> Result<Option<AdoptionProcess>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.processes.get(id).cloned())
    }

    fn fetch_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<AdoptionProcess>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store
            .processes
            .values()
            .find(|process| &process.request_id == request_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<AdoptionProcess>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        let mut processes: Vec<_> = store.processes.values().cloned().collect();
        processes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(processes)
    }

    fn request(&self, id: &RequestId) -> Result<Option<AdoptionRequest>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.requests.get(id).cloned())
    }

    fn pet(&self, id: &PetId) -> Result<Option<PetRecord>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.pets.get(id).cloned())
    }

    fn adopter(&self, id: &UserId) -> Result<Option<AdopterProfile>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.adopters.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<AdopterNotification>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<AdopterNotification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }

    pub(super) fn count(&self, template: NotificationTemplate) -> usize {
        self.events()
            .iter()
            .filter(|event| event.template == template)
            .count()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, notification: AdopterNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifications;

impl NotificationPublisher for OfflineNotifications {
    fn publish(&self, _notification: AdopterNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub(super) fn stored(&self) -> usize {
        self.files.lock().expect("storage mutex poisoned").len()
    }
}

impl CommitmentStorage for MemoryStorage {
    fn store(
        &self,
        process_id: &ProcessId,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let key = format!("memory://compromisos/{}.{}", process_id.0, format.extension());
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    fn discard(&self, reference: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .remove(reference);
        Ok(())
    }
}

pub(super) struct BrokenStorage;

impl CommitmentStorage for BrokenStorage {
    fn store(
        &self,
        _process_id: &ProcessId,
        _format: ImageFormat,
        _bytes: &[u8],
    ) -> Result<String, StorageError> {
        Err(StorageError::Backend("bucket unreachable".to_string()))
    }

    fn discard(&self, _reference: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

pub(super) type TestService =
    AdoptionProcessService<MemoryRepository, MemoryNotifications, MemoryStorage>;

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryRepository>,
    Arc<MemoryNotifications>,
    Arc<MemoryStorage>,
) {
    let repository = Arc::new(MemoryRepository::default());
    repository.seed_request("sol-1", ADOPTER_A, "pet-1");
    repository.seed_request("sol-2", ADOPTER_B, "pet-2");
    let notifications = Arc::new(MemoryNotifications::default());
    let storage = Arc::new(MemoryStorage::default());
    let service =
        AdoptionProcessService::new(repository.clone(), notifications.clone(), storage.clone());
    (service, repository, notifications, storage)
}

pub(super) fn admin() -> Caller {
    Caller::new("admin-1", Role::Admin)
}

pub(super) fn adopter(id: &str) -> Caller {
    Caller::new(id, Role::Adopter)
}

pub(super) fn request_id(raw: &str) -> RequestId {
    RequestId(raw.to_string())
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    process_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
