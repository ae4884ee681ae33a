//! # Master Store
//!
//! Owns the authoritative [`MasterData`]. Every mutation runs under one
//! async mutex as
//!
//! ```text
//! validate -> side effects -> apply to a copy -> bump version -> persist -> swap -> publish
//! ```
//!
//! A rejected mutation or a failed write leaves both the state and the
//! version untouched. Publishing goes through a `watch` channel, so a slow
//! subscriber never holds the lock; subscribers always see versions in
//! increasing order, possibly skipping intermediate ones.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tokio::sync::{watch, Mutex, MutexGuard};
use uuid::Uuid;

use super::errors::{MasterError, MasterResult};
use super::listing::{self, ListKind, ListMode};
use super::model::{
    ApiNode, App, DataNode, DataNodePatch, EntityRef, Job, LocalInterceptor, MasterData, Query,
    QueryPatch, RemoteInterceptor, Token,
};
use super::provision::{NoopProvisioner, TenantProvisioner};
use crate::jobs::{parse_cron, JobControl, JobError};
use crate::sql::ScriptLocator;

/// A published version of the configuration together with its wire form
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Arc<MasterData>,
    /// JSON encoding of `data`, shared by every push and the data file
    pub payload: Arc<str>,
}

impl Snapshot {
    fn encode(data: MasterData) -> MasterResult<Self> {
        let payload: Arc<str> = serde_json::to_string(&data)?.into();
        Ok(Self {
            data: Arc::new(data),
            payload,
        })
    }
}

/// Collections owned by an app, handled uniformly by add/update/remove
pub(crate) trait AppOwned: Clone {
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn id_mut(&mut self) -> &mut String;
    fn name(&self) -> &str;
    fn app_id(&self) -> &str;
    fn collection(app: &mut App) -> &mut Vec<Self>;
}

macro_rules! app_owned {
    ($ty:ty, $kind:literal, $field:ident) => {
        impl AppOwned for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn id_mut(&mut self) -> &mut String {
                &mut self.id
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn app_id(&self) -> &str {
                &self.app_id
            }

            fn collection(app: &mut App) -> &mut Vec<Self> {
                &mut app.$field
            }
        }
    };
}

app_owned!(Query, "Query", queries);
app_owned!(Job, "Job", jobs);
app_owned!(Token, "Token", tokens);
app_owned!(LocalInterceptor, "Local interceptor", local_interceptors);
app_owned!(RemoteInterceptor, "Remote interceptor", remote_interceptors);

fn assign_id(id: &mut String) {
    if id.trim().is_empty() {
        *id = Uuid::new_v4().to_string();
    }
}

fn add_owned<T: AppOwned>(data: &mut MasterData, mut item: T) -> MasterResult<T> {
    let app_id = item.app_id().to_string();
    let app = data
        .app_mut(&app_id)
        .ok_or_else(|| MasterError::dangling("App", &app_id))?;
    let items = T::collection(app);
    if items.iter().any(|i| i.name() == item.name()) {
        return Err(MasterError::duplicate(T::KIND, item.name()));
    }
    assign_id(item.id_mut());
    items.push(item.clone());
    Ok(item)
}

/// Replace an item in full, returning the previous version
fn update_owned<T: AppOwned>(data: &mut MasterData, item: T) -> MasterResult<T> {
    let not_found = || MasterError::not_found(T::KIND, item.id());
    let app = data.app_mut(item.app_id()).ok_or_else(not_found)?;
    let items = T::collection(app);
    if items.iter().any(|i| i.id() != item.id() && i.name() == item.name()) {
        return Err(MasterError::duplicate(T::KIND, item.name()));
    }
    let slot = items
        .iter_mut()
        .find(|i| i.id() == item.id())
        .ok_or_else(not_found)?;
    Ok(std::mem::replace(slot, item))
}

fn remove_owned<T: AppOwned>(data: &mut MasterData, target: &EntityRef) -> MasterResult<T> {
    let not_found = || MasterError::not_found(T::KIND, &target.id);
    let app = data.app_mut(&target.app_id).ok_or_else(not_found)?;
    let items = T::collection(app);
    let index = items
        .iter()
        .position(|i| i.id() == target.id)
        .ok_or_else(not_found)?;
    Ok(items.remove(index))
}

/// Job side effect to apply once a mutation is durable
enum JobEffect {
    None,
    Start(Job),
    Stop(String),
    Restart(Job),
}

pub struct MasterStore {
    state: Mutex<Arc<MasterData>>,
    publisher: watch::Sender<Snapshot>,
    data_file: Option<PathBuf>,
    scripts: ScriptLocator,
    provisioner: Arc<dyn TenantProvisioner>,
    jobs: OnceLock<Arc<dyn JobControl>>,
}

impl MasterStore {
    /// In-memory store seeded with `data`; nothing is persisted
    pub fn new(mut data: MasterData) -> Self {
        data.api_nodes.clear();
        let data = Arc::new(data);
        let payload: Arc<str> = serde_json::to_string(data.as_ref())
            .unwrap_or_default()
            .into();
        let (publisher, _) = watch::channel(Snapshot {
            data: Arc::clone(&data),
            payload,
        });
        Self {
            state: Mutex::new(data),
            publisher,
            data_file: None,
            scripts: ScriptLocator::default(),
            provisioner: Arc::new(NoopProvisioner),
            jobs: OnceLock::new(),
        }
    }

    /// Seed from `path` when it exists and persist every mutation to it
    pub fn open(path: impl Into<PathBuf>) -> MasterResult<Self> {
        let path = path.into();
        let data = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                MasterData::default()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            MasterData::default()
        };
        tracing::info!(path = %path.display(), version = data.version, "master data loaded");
        Ok(Self::new(data).with_data_file(path))
    }

    pub fn with_data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = Some(path.into());
        self
    }

    pub fn with_scripts(mut self, scripts: ScriptLocator) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn TenantProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Attach the job scheduler. Only the master runs jobs, so a store
    /// without one skips every job side effect.
    pub fn attach_jobs(&self, jobs: Arc<dyn JobControl>) -> bool {
        self.jobs.set(jobs).is_ok()
    }

    pub fn data_file(&self) -> Option<&Path> {
        self.data_file.as_deref()
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.publisher.borrow().clone()
    }

    /// The latest published configuration
    pub fn current(&self) -> Arc<MasterData> {
        Arc::clone(&self.publisher.borrow().data)
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.publisher.subscribe()
    }

    // ==================
    // Mutation core
    // ==================

    /// Apply `op` to a copy of the current state and commit it
    async fn mutate<R>(
        &self,
        op: impl FnOnce(&mut MasterData) -> MasterResult<R>,
    ) -> MasterResult<R> {
        let mut guard = self.state.lock().await;
        let mut next = MasterData::clone(&guard);
        let result = op(&mut next)?;
        self.commit(&mut guard, next).await?;
        Ok(result)
    }

    async fn commit(
        &self,
        guard: &mut MutexGuard<'_, Arc<MasterData>>,
        mut next: MasterData,
    ) -> MasterResult<()> {
        next.version += 1;
        let snapshot = Snapshot::encode(next)?;
        self.persist(&snapshot.payload).await?;
        **guard = Arc::clone(&snapshot.data);
        tracing::debug!(version = snapshot.data.version, "master data committed");
        self.publisher.send_replace(snapshot);
        Ok(())
    }

    async fn persist(&self, payload: &str) -> MasterResult<()> {
        let Some(path) = &self.data_file else {
            return Ok(());
        };
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        tokio::fs::write(&staging, payload).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }

    /// Install a snapshot received from the master. Versions are taken
    /// as-is and nothing is persisted.
    pub async fn replace(&self, mut data: MasterData) -> MasterResult<()> {
        data.api_nodes.clear();
        let mut guard = self.state.lock().await;
        let snapshot = Snapshot::encode(data)?;
        *guard = Arc::clone(&snapshot.data);
        self.publisher.send_replace(snapshot);
        Ok(())
    }

    fn apply_job_effect(&self, effect: JobEffect) {
        let Some(jobs) = self.jobs.get() else {
            return;
        };
        let result = match &effect {
            JobEffect::None => Ok(()),
            JobEffect::Start(job) => jobs.start(job),
            JobEffect::Stop(id) => match jobs.stop(id) {
                Err(JobError::NotStarted(_)) => Ok(()),
                other => other,
            },
            JobEffect::Restart(job) => jobs.restart(job),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "job side effect failed");
        }
    }

    fn is_started(&self, job_id: &str) -> bool {
        self.jobs.get().is_some_and(|j| j.is_started(job_id))
    }

    // ==================
    // Data nodes
    // ==================

    pub async fn add_data_node(&self, mut node: DataNode) -> MasterResult<()> {
        self.mutate(|data| {
            if data.data_nodes.iter().any(|d| d.name == node.name) {
                return Err(MasterError::duplicate("Data node", &node.name));
            }
            assign_id(&mut node.id);
            data.data_nodes.push(node);
            Ok(())
        })
        .await
    }

    pub async fn update_data_node(&self, patch: DataNodePatch) -> MasterResult<()> {
        self.mutate(|data| {
            if let Some(name) = &patch.name {
                if data.data_nodes.iter().any(|d| d.id != patch.id && &d.name == name) {
                    return Err(MasterError::duplicate("Data node", name));
                }
            }
            let node = data
                .data_nodes
                .iter_mut()
                .find(|d| d.id == patch.id)
                .ok_or_else(|| MasterError::not_found("Data node", &patch.id))?;
            let DataNodePatch {
                name,
                username,
                password,
                host,
                port,
                note,
                status,
                ..
            } = patch;
            if let Some(v) = name {
                node.name = v;
            }
            if let Some(v) = username {
                node.username = v;
            }
            if let Some(v) = password {
                node.password = v;
            }
            if let Some(v) = host {
                node.host = v;
            }
            if let Some(v) = port {
                node.port = v;
            }
            if let Some(v) = note {
                node.note = v;
            }
            if let Some(v) = status {
                node.status = v;
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_data_node(&self, id: &str) -> MasterResult<()> {
        self.mutate(|data| {
            let index = data
                .data_nodes
                .iter()
                .position(|d| d.id == id)
                .ok_or_else(|| MasterError::not_found("Data node", id))?;
            if let Some(app) = data.apps.iter().find(|a| a.data_node_id == id) {
                return Err(MasterError::Invalid {
                    field: "data node",
                    reason: format!("still used by app {}", app.name),
                });
            }
            data.data_nodes.remove(index);
            Ok(())
        })
        .await
    }

    // ==================
    // Apps
    // ==================

    pub async fn add_app(&self, mut app: App) -> MasterResult<()> {
        let mut guard = self.state.lock().await;
        if guard.apps.iter().any(|a| a.name == app.name) {
            return Err(MasterError::duplicate("App", &app.name));
        }
        let node = guard
            .data_node(&app.data_node_id)
            .cloned()
            .ok_or_else(|| MasterError::dangling("Data node", &app.data_node_id))?;
        assign_id(&mut app.id);
        self.provisioner.provision(&app, &node).await?;

        let mut next = MasterData::clone(&guard);
        next.apps.push(app);
        self.commit(&mut guard, next).await
    }

    /// Update an app's own fields; its queries, jobs, tokens and
    /// interceptors are kept
    pub async fn update_app(&self, app: App) -> MasterResult<()> {
        let mut guard = self.state.lock().await;
        let existing = guard
            .app(&app.id)
            .ok_or_else(|| MasterError::not_found("App", &app.id))?;
        if guard.apps.iter().any(|a| a.id != app.id && a.name == app.name) {
            return Err(MasterError::duplicate("App", &app.name));
        }
        let node = guard
            .data_node(&app.data_node_id)
            .cloned()
            .ok_or_else(|| MasterError::dangling("Data node", &app.data_node_id))?;
        let updated = App {
            queries: existing.queries.clone(),
            jobs: existing.jobs.clone(),
            tokens: existing.tokens.clone(),
            local_interceptors: existing.local_interceptors.clone(),
            remote_interceptors: existing.remote_interceptors.clone(),
            ..app
        };
        self.provisioner.provision(&updated, &node).await?;

        let mut next = MasterData::clone(&guard);
        if let Some(slot) = next.app_mut(&updated.id) {
            *slot = updated;
        }
        self.commit(&mut guard, next).await
    }

    pub async fn remove_app(&self, id: &str) -> MasterResult<()> {
        let mut guard = self.state.lock().await;
        let app = guard
            .app(id)
            .cloned()
            .ok_or_else(|| MasterError::not_found("App", id))?;
        if let Some(node) = guard.data_node(&app.data_node_id).cloned() {
            self.provisioner.deprovision(&app, &node).await?;
        }

        let mut next = MasterData::clone(&guard);
        next.apps.retain(|a| a.id != id);
        self.commit(&mut guard, next).await?;
        drop(guard);

        for job in &app.jobs {
            if self.is_started(&job.id) {
                self.apply_job_effect(JobEffect::Stop(job.id.clone()));
            }
        }
        Ok(())
    }

    fn app_name(data: &MasterData, app_id: &str) -> MasterResult<String> {
        data.app(app_id)
            .map(|a| a.name.clone())
            .ok_or_else(|| MasterError::dangling("App", app_id))
    }

    // ==================
    // Queries
    // ==================

    fn resolve_query(&self, app_name: &str, query: &mut Query) -> MasterResult<()> {
        let script = self
            .scripts
            .resolve(app_name, &query.name, &query.script_path, &query.script_text)
            .map_err(|e| MasterError::Script(e.to_string()))?;
        query.script_path = script.path;
        query.script_text = script.text;
        Ok(())
    }

    pub async fn add_query(&self, mut query: Query) -> MasterResult<()> {
        self.mutate(|data| {
            let app_name = Self::app_name(data, &query.app_id)?;
            if data
                .app(&query.app_id)
                .is_some_and(|a| a.query(&query.name).is_some())
            {
                return Err(MasterError::duplicate("Query", &query.name));
            }
            self.resolve_query(&app_name, &mut query)?;
            add_owned(data, query).map(|_| ())
        })
        .await
    }

    pub async fn update_query(&self, patch: QueryPatch) -> MasterResult<()> {
        self.mutate(|data| {
            let not_found = || MasterError::not_found("Query", &patch.id);
            let app_name = data
                .app(&patch.app_id)
                .map(|a| a.name.clone())
                .ok_or_else(not_found)?;
            let mut query = data
                .app(&patch.app_id)
                .and_then(|a| a.queries.iter().find(|q| q.id == patch.id))
                .cloned()
                .ok_or_else(not_found)?;
            let QueryPatch {
                name,
                script_path,
                script_text,
                note,
                status,
                ..
            } = patch;
            if let Some(v) = name {
                query.name = v;
            }
            if let Some(v) = script_path {
                query.script_path = v;
            }
            if let Some(v) = script_text {
                query.script_text = v;
            }
            if let Some(v) = note {
                query.note = v;
            }
            if let Some(v) = status {
                query.status = v;
            }
            self.resolve_query(&app_name, &mut query)?;
            update_owned(data, query).map(|_| ())
        })
        .await
    }

    pub async fn remove_query(&self, target: &EntityRef) -> MasterResult<()> {
        self.mutate(|data| remove_owned::<Query>(data, target).map(|_| ()))
            .await
    }

    // ==================
    // Jobs
    // ==================

    fn prepare_job(&self, data: &MasterData, job: &mut Job) -> MasterResult<()> {
        let app_name = Self::app_name(data, &job.app_id)?;
        parse_cron(&job.cron).map_err(|e| MasterError::Invalid {
            field: "cron",
            reason: e.to_string(),
        })?;
        let main = self
            .scripts
            .resolve(&app_name, &job.name, &job.script_path, &job.script_text)
            .map_err(|e| MasterError::Script(e.to_string()))?;
        job.script_path = main.path;
        job.script_text = main.text;
        if !job.loop_script_path.is_empty() || !job.loop_script_text.is_empty() {
            let looped = self
                .scripts
                .resolve(&app_name, &job.name, &job.loop_script_path, &job.loop_script_text)
                .map_err(|e| MasterError::Script(e.to_string()))?;
            job.loop_script_path = looped.path;
            job.loop_script_text = looped.text;
        }
        Ok(())
    }

    pub async fn add_job(&self, mut job: Job) -> MasterResult<()> {
        let effect = self
            .mutate(|data| {
                self.prepare_job(data, &mut job)?;
                let job = add_owned(data, job)?;
                Ok(if job.auto_start {
                    JobEffect::Start(job)
                } else {
                    JobEffect::None
                })
            })
            .await?;
        self.apply_job_effect(effect);
        Ok(())
    }

    pub async fn update_job(&self, mut job: Job) -> MasterResult<()> {
        let effect = self
            .mutate(|data| {
                self.prepare_job(data, &mut job)?;
                let updated = job.clone();
                update_owned(data, job)?;
                Ok(if self.is_started(&updated.id) {
                    JobEffect::Restart(updated)
                } else {
                    JobEffect::None
                })
            })
            .await?;
        self.apply_job_effect(effect);
        Ok(())
    }

    pub async fn remove_job(&self, target: &EntityRef) -> MasterResult<()> {
        let removed = self.mutate(|data| remove_owned::<Job>(data, target)).await?;
        if self.is_started(&removed.id) {
            self.apply_job_effect(JobEffect::Stop(removed.id));
        }
        Ok(())
    }

    fn find_job(&self, target: &EntityRef) -> MasterResult<(Arc<dyn JobControl>, Job)> {
        let jobs = self
            .jobs
            .get()
            .cloned()
            .ok_or_else(|| MasterError::Job(JobError::Unavailable.to_string()))?;
        let job = self
            .current()
            .app(&target.app_id)
            .and_then(|a| a.job(&target.id))
            .cloned()
            .ok_or_else(|| MasterError::not_found("Job", &target.id))?;
        Ok((jobs, job))
    }

    pub fn start_job(&self, target: &EntityRef) -> MasterResult<()> {
        let (jobs, job) = self.find_job(target)?;
        jobs.start(&job).map_err(|e| MasterError::Job(e.to_string()))
    }

    pub fn stop_job(&self, target: &EntityRef) -> MasterResult<()> {
        let (jobs, job) = self.find_job(target)?;
        jobs.stop(&job.id).map_err(|e| MasterError::Job(e.to_string()))
    }

    pub fn restart_job(&self, target: &EntityRef) -> MasterResult<()> {
        let (jobs, job) = self.find_job(target)?;
        jobs.restart(&job).map_err(|e| MasterError::Job(e.to_string()))
    }

    /// Start every job flagged `auto_start`; failures are logged
    pub fn start_auto_jobs(&self) -> usize {
        let Some(jobs) = self.jobs.get() else {
            return 0;
        };
        let mut started = 0;
        for job in self.current().jobs().filter(|j| j.auto_start) {
            match jobs.start(job) {
                Ok(()) => started += 1,
                Err(e) => tracing::warn!(job = %job.name, error = %e, "auto start failed"),
            }
        }
        started
    }

    // ==================
    // Tokens and interceptors
    // ==================

    pub async fn add_token(&self, token: Token) -> MasterResult<()> {
        self.mutate(|data| add_owned(data, token).map(|_| ())).await
    }

    pub async fn update_token(&self, token: Token) -> MasterResult<()> {
        self.mutate(|data| update_owned(data, token).map(|_| ())).await
    }

    pub async fn remove_token(&self, target: &EntityRef) -> MasterResult<()> {
        self.mutate(|data| remove_owned::<Token>(data, target).map(|_| ()))
            .await
    }

    pub async fn add_local_interceptor(&self, li: LocalInterceptor) -> MasterResult<()> {
        self.mutate(|data| add_owned(data, li).map(|_| ())).await
    }

    pub async fn update_local_interceptor(&self, li: LocalInterceptor) -> MasterResult<()> {
        self.mutate(|data| update_owned(data, li).map(|_| ())).await
    }

    pub async fn remove_local_interceptor(&self, target: &EntityRef) -> MasterResult<()> {
        self.mutate(|data| remove_owned::<LocalInterceptor>(data, target).map(|_| ()))
            .await
    }

    pub async fn add_remote_interceptor(&self, ri: RemoteInterceptor) -> MasterResult<()> {
        self.mutate(|data| add_owned(data, ri).map(|_| ())).await
    }

    pub async fn update_remote_interceptor(&self, ri: RemoteInterceptor) -> MasterResult<()> {
        self.mutate(|data| update_owned(data, ri).map(|_| ())).await
    }

    pub async fn remove_remote_interceptor(&self, target: &EntityRef) -> MasterResult<()> {
        self.mutate(|data| remove_owned::<RemoteInterceptor>(data, target).map(|_| ()))
            .await
    }

    // ==================
    // Reads
    // ==================

    pub fn list(&self, kind: ListKind, mode: ListMode, app_id: Option<&str>) -> String {
        listing::list(&self.current(), kind, mode, app_id)
    }

    /// Current configuration with the given connected slaves attached
    pub fn show(&self, api_nodes: Vec<ApiNode>) -> MasterResult<String> {
        let mut data = MasterData::clone(&self.current());
        data.api_nodes = api_nodes;
        Ok(serde_json::to_string_pretty(&data)?)
    }
}
