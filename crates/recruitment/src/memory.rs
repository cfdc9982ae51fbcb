//! In-process adapters for every storage seam. The API binary runs on these
//! until a database backend exists, and the tests drive the service with them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::access::{
    GroupMembershipStore, Identity, IdentityDirectory, IdentityId, Role, RoleGroup, RoleStore,
    StoreError,
};
use crate::documents::{DocumentStore, StorageError};
use crate::recruitment::{
    Application, ApplicationId, ApplicationRepository, Notification, Notifier, NotifyError,
    Posting, PostingId, PostingRepository, RepositoryError,
};

#[derive(Default)]
struct AccountsState {
    next_id: u64,
    identities: BTreeMap<IdentityId, Identity>,
    roles: HashMap<IdentityId, Role>,
}

/// Identity directory and role store sharing one account table.
#[derive(Clone, Default)]
pub struct InMemoryAccounts {
    state: Arc<Mutex<AccountsState>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityDirectory for InMemoryAccounts {
    fn create(
        &self,
        handle: &str,
        email: Option<String>,
        elevated: bool,
    ) -> Result<Identity, StoreError> {
        let mut state = self.state.lock().expect("accounts mutex poisoned");
        if state
            .identities
            .values()
            .any(|identity| identity.handle.eq_ignore_ascii_case(handle))
        {
            return Err(StoreError::DuplicateHandle(handle.to_string()));
        }
        if let Some(email) = &email {
            let taken = state.identities.values().any(|identity| {
                identity
                    .email
                    .as_deref()
                    .is_some_and(|existing| existing.eq_ignore_ascii_case(email))
            });
            if taken {
                return Err(StoreError::DuplicateEmail(email.clone()));
            }
        }
        state.next_id += 1;
        let identity = Identity {
            id: IdentityId(state.next_id),
            handle: handle.to_string(),
            email,
            elevated,
        };
        state.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    fn find(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let state = self.state.lock().expect("accounts mutex poisoned");
        Ok(state.identities.get(&id).cloned())
    }

    fn remove(&self, id: IdentityId) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("accounts mutex poisoned");
        state.roles.remove(&id);
        state
            .identities
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::UnknownIdentity(id))
    }

    fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let state = self.state.lock().expect("accounts mutex poisoned");
        Ok(state.identities.values().cloned().collect())
    }
}

impl RoleStore for InMemoryAccounts {
    fn get_role(&self, id: IdentityId) -> Result<Option<Role>, StoreError> {
        let state = self.state.lock().expect("accounts mutex poisoned");
        Ok(state.roles.get(&id).copied())
    }

    fn set_role(&self, id: IdentityId, role: Role) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("accounts mutex poisoned");
        if !state.identities.contains_key(&id) {
            return Err(StoreError::UnknownIdentity(id));
        }
        state.roles.insert(id, role);
        Ok(())
    }

    fn elevated(&self, id: IdentityId) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("accounts mutex poisoned");
        state
            .identities
            .get(&id)
            .map(|identity| identity.elevated)
            .ok_or(StoreError::UnknownIdentity(id))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGroups {
    memberships: Arc<Mutex<HashMap<IdentityId, BTreeSet<RoleGroup>>>>,
}

impl InMemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupMembershipStore for InMemoryGroups {
    fn replace_role_groups(&self, id: IdentityId, group: RoleGroup) -> Result<(), StoreError> {
        let mut memberships = self.memberships.lock().expect("groups mutex poisoned");
        let groups = memberships.entry(id).or_default();
        groups.clear();
        groups.insert(group);
        Ok(())
    }

    fn role_groups(&self, id: IdentityId) -> Result<BTreeSet<RoleGroup>, StoreError> {
        let memberships = self.memberships.lock().expect("groups mutex poisoned");
        Ok(memberships.get(&id).cloned().unwrap_or_default())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPostings {
    records: Arc<Mutex<BTreeMap<PostingId, Posting>>>,
}

impl InMemoryPostings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PostingRepository for InMemoryPostings {
    fn insert(&self, posting: Posting) -> Result<Posting, RepositoryError> {
        let mut records = self.records.lock().expect("postings mutex poisoned");
        if records.contains_key(&posting.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(posting.id, posting.clone());
        Ok(posting)
    }

    fn update(&self, posting: Posting) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().expect("postings mutex poisoned");
        match records.get_mut(&posting.id) {
            Some(existing) => {
                *existing = posting;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn remove(&self, id: PostingId) -> Result<Posting, RepositoryError> {
        let mut records = self.records.lock().expect("postings mutex poisoned");
        records.remove(&id).ok_or(RepositoryError::NotFound)
    }

    fn fetch(&self, id: PostingId) -> Result<Option<Posting>, RepositoryError> {
        let records = self.records.lock().expect("postings mutex poisoned");
        Ok(records.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Posting>, RepositoryError> {
        let records = self.records.lock().expect("postings mutex poisoned");
        Ok(records.values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApplications {
    records: Arc<Mutex<BTreeMap<ApplicationId, Application>>>,
}

impl InMemoryApplications {
    pub fn new() -> Self {
        Self::default()
    }

    fn select<F>(&self, keep: F) -> Vec<Application>
    where
        F: Fn(&Application) -> bool,
    {
        let records = self.records.lock().expect("applications mutex poisoned");
        records.values().filter(|record| keep(record)).cloned().collect()
    }
}

impl ApplicationRepository for InMemoryApplications {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut records = self.records.lock().expect("applications mutex poisoned");
        let duplicate = records.contains_key(&application.id)
            || records.values().any(|existing| {
                existing.candidate == application.candidate
                    && existing.posting == application.posting
            });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        records.insert(application.id, application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().expect("applications mutex poisoned");
        match records.get_mut(&application.id) {
            Some(existing) => {
                *existing = application;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn remove(&self, id: ApplicationId) -> Result<Application, RepositoryError> {
        let mut records = self.records.lock().expect("applications mutex poisoned");
        records.remove(&id).ok_or(RepositoryError::NotFound)
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let records = self.records.lock().expect("applications mutex poisoned");
        Ok(records.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Application>, RepositoryError> {
        Ok(self.select(|_| true))
    }

    fn for_candidate(&self, candidate: IdentityId) -> Result<Vec<Application>, RepositoryError> {
        Ok(self.select(|record| record.candidate == candidate))
    }

    fn for_posting(&self, posting: PostingId) -> Result<Vec<Application>, RepositoryError> {
        Ok(self.select(|record| record.posting == posting))
    }

    fn remove_for_posting(&self, posting: PostingId) -> Result<Vec<Application>, RepositoryError> {
        let mut records = self.records.lock().expect("applications mutex poisoned");
        let (removed, kept): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut *records)
            .into_iter()
            .partition(|(_, record)| record.posting == posting);
        *records = kept;
        Ok(removed.into_values().collect())
    }
}

/// Keeps documents in a map keyed by storage key.
#[derive(Clone, Default)]
pub struct InMemoryDocuments {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let blobs = self.blobs.lock().expect("documents mutex poisoned");
        let mut keys: Vec<String> = blobs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl DocumentStore for InMemoryDocuments {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().expect("documents mutex poisoned");
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let blobs = self.blobs.lock().expect("documents mutex poisoned");
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Missing(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().expect("documents mutex poisoned");
        blobs.remove(key);
        Ok(())
    }
}

/// In-app inbox that records every delivered notification.
#[derive(Clone, Default)]
pub struct InMemoryInbox {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().expect("inbox mutex poisoned").clone()
    }

    pub fn for_recipient(&self, recipient: IdentityId) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|notification| notification.recipient == recipient)
            .collect()
    }
}

impl Notifier for InMemoryInbox {
    fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut delivered = self
            .delivered
            .lock()
            .map_err(|_| NotifyError::Transport("inbox mutex poisoned".to_string()))?;
        delivered.push(notification);
        Ok(())
    }
}
