use std::sync::Arc;

use crate::access::{Caller, ElevationPolicy, IdentityDirectory, Role};
use crate::documents::{DocumentStore, StorageError};
use crate::memory::{
    InMemoryAccounts, InMemoryApplications, InMemoryDocuments, InMemoryGroups, InMemoryInbox,
    InMemoryPostings,
};
use crate::recruitment::{
    Notification, Notifier, NotifyError, Posting, PostingDraft, RecruitmentBackends,
    RecruitmentService, Upload,
};

pub(super) struct Harness {
    pub service: Arc<RecruitmentService>,
    pub accounts: InMemoryAccounts,
    pub documents: InMemoryDocuments,
    pub inbox: InMemoryInbox,
}

pub(super) fn harness() -> Harness {
    let inbox = InMemoryInbox::new();
    let documents = InMemoryDocuments::new();
    build(
        Arc::new(inbox.clone()),
        inbox,
        Arc::new(documents.clone()),
        documents,
        ElevationPolicy::Bypass,
    )
}

/// Harness with a custom notifier; its own inbox stays empty.
pub(super) fn harness_with(notifier: Arc<dyn Notifier>, elevation: ElevationPolicy) -> Harness {
    let documents = InMemoryDocuments::new();
    build(
        notifier,
        InMemoryInbox::new(),
        Arc::new(documents.clone()),
        documents,
        elevation,
    )
}

/// Harness whose document store refuses writes to keys containing `refused`.
/// `Harness::documents` still shows what was actually written.
pub(super) fn harness_refusing(refused: &'static str) -> Harness {
    let inbox = InMemoryInbox::new();
    let documents = InMemoryDocuments::new();
    let store = RefusingDocuments {
        inner: documents.clone(),
        refused,
    };
    build(
        Arc::new(inbox.clone()),
        inbox,
        Arc::new(store),
        documents,
        ElevationPolicy::Bypass,
    )
}

/// Harness over an arbitrary document store. `Harness::documents` is
/// detached from it and stays empty.
pub(super) fn harness_over(store: Arc<dyn DocumentStore>) -> Harness {
    let inbox = InMemoryInbox::new();
    build(
        Arc::new(inbox.clone()),
        inbox,
        store,
        InMemoryDocuments::new(),
        ElevationPolicy::Bypass,
    )
}

fn build(
    notifier: Arc<dyn Notifier>,
    inbox: InMemoryInbox,
    store: Arc<dyn DocumentStore>,
    documents: InMemoryDocuments,
    elevation: ElevationPolicy,
) -> Harness {
    let accounts = InMemoryAccounts::new();
    let backends = RecruitmentBackends {
        directory: Arc::new(accounts.clone()),
        roles: Arc::new(accounts.clone()),
        groups: Arc::new(InMemoryGroups::new()),
        postings: Arc::new(InMemoryPostings::new()),
        applications: Arc::new(InMemoryApplications::new()),
        documents: store,
        notifier,
    };
    Harness {
        service: Arc::new(RecruitmentService::new(backends, elevation)),
        accounts,
        documents,
        inbox,
    }
}

impl Harness {
    pub fn member(&self, handle: &str, role: Option<Role>) -> Caller {
        let identity = self
            .accounts
            .create(handle, Some(format!("{handle}@example.test")), false)
            .expect("identity created");
        if let Some(role) = role {
            self.service
                .assignments()
                .assign(identity.id, role)
                .expect("role assigned");
        }
        Caller::Identified(identity)
    }

    pub fn elevated(&self, handle: &str) -> Caller {
        let identity = self
            .accounts
            .create(handle, None, true)
            .expect("identity created");
        Caller::Identified(identity)
    }

    pub fn posting(&self, by: &Caller, title: &str) -> Posting {
        self.service
            .create_posting(by, draft(title))
            .expect("posting created")
    }
}

pub(super) fn draft(title: &str) -> PostingDraft {
    PostingDraft {
        title: title.to_string(),
        description: format!("{title} role description"),
        required_skills: "rust, sql".to_string(),
        active: None,
    }
}

pub(super) fn pdf(name: &str) -> Upload {
    let mut bytes = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n".to_vec();
    bytes.resize(4 * 1024, b' ');
    Upload::new(name, bytes)
}

pub(super) fn docx(name: &str) -> Upload {
    let mut bytes = b"PK\x03\x04\x14\x00\x06\x00".to_vec();
    bytes.resize(2 * 1024, 0);
    Upload::new(name, bytes)
}

/// Notifier whose transport is always down.
pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn deliver(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

struct RefusingDocuments {
    inner: InMemoryDocuments,
    refused: &'static str,
}

impl DocumentStore for RefusingDocuments {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if key.contains(self.refused) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.put(key, bytes)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key)
    }
}
