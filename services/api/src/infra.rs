use metrics_exporter_prometheus::PrometheusHandle;
use recruitment::access::{Identity, IdentityDirectory, StoreError};
use recruitment::config::AppConfig;
use recruitment::documents::FsDocumentStore;
use recruitment::memory::{
    InMemoryAccounts, InMemoryApplications, InMemoryGroups, InMemoryInbox, InMemoryPostings,
};
use recruitment::recruitment::{RecruitmentBackends, RecruitmentService};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Service wired to process-local stores with documents on disk.
pub(crate) struct Runtime {
    pub(crate) service: Arc<RecruitmentService>,
    pub(crate) accounts: InMemoryAccounts,
}

pub(crate) fn build_runtime(config: &AppConfig) -> Runtime {
    let accounts = InMemoryAccounts::new();
    let backends = RecruitmentBackends {
        directory: Arc::new(accounts.clone()),
        roles: Arc::new(accounts.clone()),
        groups: Arc::new(InMemoryGroups::new()),
        postings: Arc::new(InMemoryPostings::new()),
        applications: Arc::new(InMemoryApplications::new()),
        documents: Arc::new(FsDocumentStore::new(&config.storage.media_root)),
        notifier: Arc::new(InMemoryInbox::new()),
    };
    let service = Arc::new(RecruitmentService::new(backends, config.access.elevation));

    Runtime { service, accounts }
}

/// Creates the elevated operator account used to hand out the first roles.
pub(crate) fn seed_operator(runtime: &Runtime, handle: &str) -> Result<Identity, StoreError> {
    let operator = runtime.accounts.create(handle, None, true)?;
    info!(identity = %operator.id, handle = %operator.handle, "operator account seeded");
    Ok(operator)
}
