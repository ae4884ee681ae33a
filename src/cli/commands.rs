//! CLI command implementations
//!
//! `service start` boots a node in a fixed order:
//!
//! 1. Configuration: file, then flags, then validation
//! 2. Master data: the data file on a master, empty on a slave
//! 3. Tenant connectors, refreshed on every snapshot
//! 4. Job scheduler and auto-start jobs (master only)
//! 5. Interceptor registry and data operator
//! 6. Control plane plus the slave hub (master) or the master link (slave)
//! 7. HTTP listener, served until `/sys/shutdown` or Ctrl-C
//!
//! Every other command is a thin client: it encodes one control command,
//! posts it to `--master` and prints the answer.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::{create_mailer, JwtConfig, JwtManager};
use crate::core::interceptors::HttpTransport;
use crate::core::{Builtins, DataOperator, FieldCriteria, InterceptorRegistry};
use crate::http_server::{HttpServer, HttpServerConfig, NodeState};
use crate::jobs::{JobControl, JobRunner, JobScheduler};
use crate::master::{ListKind, MasterData, MasterStore, MySqlProvisioner};
use crate::observability::{self, log_event, Event, LogConfig};
use crate::replication::{
    ControlClient, ControlCommand, ControlPlane, MasterHub, NodeRole, SlaveHello, SlaveLink,
};
use crate::sql::mysql::MySqlFactory;
use crate::sql::{ConnectorRegistry, ScriptLocator};

use super::args::{
    ApiNodeAction, AppAction, Cli, Command, DataNodeAction, JobAction, ListArgs,
    LocalInterceptorAction, MasterAction, QueryAction, RemoteInterceptorAction, Remote,
    ServiceAction, ServiceArgs, TokenAction,
};
use super::config::Config;
use super::errors::{CliError, CliResult};

/// Timeout for one CLI round trip
pub const CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    observability::init(&LogConfig::from_env(cli.log_json));
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;
    rt.block_on(dispatch(cmd))
}

async fn dispatch(cmd: Command) -> CliResult<()> {
    let (remote, command) = match cmd {
        Command::Service {
            action: ServiceAction::Start(args),
        } => return start(args).await,
        Command::Service {
            action: ServiceAction::Stop { port },
        } => return stop(port).await,
        Command::Datanode { remote, action } => (remote, datanode_command(action)),
        Command::App { remote, action } => (remote, app_command(action)),
        Command::Query { remote, action } => (remote, query_command(action)),
        Command::Job { remote, action } => (remote, job_command(action)),
        Command::Token { remote, action } => (remote, token_command(action)),
        Command::LocalInterceptor { remote, action } => {
            (remote, local_interceptor_command(action))
        }
        Command::RemoteInterceptor { remote, action } => {
            (remote, remote_interceptor_command(action))
        }
        Command::Apinode {
            remote,
            action: ApiNodeAction::List(args),
        } => (remote, ControlCommand::ListApiNodes(args.mode())),
        Command::Master {
            remote,
            action: MasterAction::Show,
        } => (remote, ControlCommand::ShowMaster),
    };
    let output = send_command(&remote, &command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

// ==================
// Thin client
// ==================

/// Post one command to the node and return its trimmed answer
pub async fn send_command(remote: &Remote, command: &ControlCommand) -> CliResult<String> {
    let client = ControlClient::new(&remote.master, Some(CLI_TIMEOUT))?;
    let envelope = command.encode()?;
    tracing::debug!(command = %envelope.tag, master = %client.url(), "sending command");
    let answer = client.send(&envelope).await?;
    Ok(answer.trim().to_string())
}

fn list(kind: ListKind, args: ListArgs) -> ControlCommand {
    ControlCommand::List {
        kind,
        mode: args.mode(),
        app_id: args.app,
    }
}

fn datanode_command(action: DataNodeAction) -> ControlCommand {
    match action {
        DataNodeAction::List(args) => list(ListKind::DataNodes, args),
        DataNodeAction::Add(args) => ControlCommand::AddDataNode(args.into()),
        DataNodeAction::Update(args) => ControlCommand::UpdateDataNode(args.into()),
        DataNodeAction::Remove { id } => ControlCommand::RemoveDataNode(id),
    }
}

fn app_command(action: AppAction) -> ControlCommand {
    match action {
        AppAction::List(args) => list(ListKind::Apps, args),
        AppAction::Add(args) => ControlCommand::AddApp(args.into_app(String::new())),
        AppAction::Update { id, app } => ControlCommand::UpdateApp(app.into_app(id)),
        AppAction::Remove { id } => ControlCommand::RemoveApp(id),
    }
}

fn query_command(action: QueryAction) -> ControlCommand {
    match action {
        QueryAction::List(args) => list(ListKind::Queries, args),
        QueryAction::Add(args) => ControlCommand::AddQuery(args.into()),
        QueryAction::Update(args) => ControlCommand::UpdateQuery(args.into()),
        QueryAction::Remove(target) => ControlCommand::RemoveQuery(target.into()),
    }
}

fn job_command(action: JobAction) -> ControlCommand {
    match action {
        JobAction::List(args) => list(ListKind::Jobs, args),
        JobAction::Add(args) => ControlCommand::AddJob(args.into_job(String::new())),
        JobAction::Update { id, job } => ControlCommand::UpdateJob(job.into_job(id)),
        JobAction::Remove(target) => ControlCommand::RemoveJob(target.into()),
        JobAction::Start(target) => ControlCommand::StartJob(target.into()),
        JobAction::Stop(target) => ControlCommand::StopJob(target.into()),
        JobAction::Restart(target) => ControlCommand::RestartJob(target.into()),
    }
}

fn token_command(action: TokenAction) -> ControlCommand {
    match action {
        TokenAction::List(args) => list(ListKind::Tokens, args),
        TokenAction::Add { id, token } => {
            ControlCommand::AddToken(token.into_token(id.unwrap_or_default()))
        }
        TokenAction::Update { id, token } => ControlCommand::UpdateToken(token.into_token(id)),
        TokenAction::Remove(target) => ControlCommand::RemoveToken(target.into()),
    }
}

fn local_interceptor_command(action: LocalInterceptorAction) -> ControlCommand {
    match action {
        LocalInterceptorAction::List(args) => list(ListKind::LocalInterceptors, args),
        LocalInterceptorAction::Add(args) => {
            ControlCommand::AddLocalInterceptor(args.into_interceptor(String::new()))
        }
        LocalInterceptorAction::Update { id, interceptor } => {
            ControlCommand::UpdateLocalInterceptor(interceptor.into_interceptor(id))
        }
        LocalInterceptorAction::Remove(target) => {
            ControlCommand::RemoveLocalInterceptor(target.into())
        }
    }
}

fn remote_interceptor_command(action: RemoteInterceptorAction) -> ControlCommand {
    match action {
        RemoteInterceptorAction::List(args) => list(ListKind::RemoteInterceptors, args),
        RemoteInterceptorAction::Add(args) => {
            ControlCommand::AddRemoteInterceptor(args.into_interceptor(String::new()))
        }
        RemoteInterceptorAction::Update { id, interceptor } => {
            ControlCommand::UpdateRemoteInterceptor(interceptor.into_interceptor(id))
        }
        RemoteInterceptorAction::Remove(target) => {
            ControlCommand::RemoveRemoteInterceptor(target.into())
        }
    }
}

/// Ask the node listening on the local `port` to shut down
pub async fn stop(port: u16) -> CliResult<()> {
    let url = format!("http://127.0.0.1:{}/sys/shutdown", port);
    let response = reqwest::Client::builder()
        .timeout(CLI_TIMEOUT)
        .build()
        .map_err(|e| CliError::transport_error(e.to_string()))?
        .post(&url)
        .send()
        .await
        .map_err(|e| CliError::transport_error(e.to_string()))?;
    let body = response.text().await.map_err(|e| CliError::transport_error(e.to_string()))?;
    if !body.trim().is_empty() {
        println!("{}", body.trim());
    }
    Ok(())
}

// ==================
// Node boot
// ==================

/// Configuration file overlaid with the command line flags
pub fn load_config(args: ServiceArgs) -> CliResult<Config> {
    let mut config = Config::discover(args.conf_file.as_deref())?;
    apply_flags(&mut config, args);
    config.validate()?;
    config.ensure_id();
    Ok(config)
}

fn apply_flags(config: &mut Config, args: ServiceArgs) {
    if let Some(id) = args.id {
        config.id = id;
    }
    if let Some(slave_of) = args.slave_of {
        config.slave_of = slave_of;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_file) = args.data_file {
        config.data_file = data_file;
    }
    if let Some(script_dir) = args.script_dir {
        config.script_dir = script_dir;
    }
    if let Some(secret) = args.secret {
        config.secret = secret;
    }
}

/// Boot a node and serve until shut down
pub async fn start(args: ServiceArgs) -> CliResult<()> {
    log_event(Event::BootStart);
    let node = match load_config(args) {
        Ok(config) => {
            log_event(Event::ConfigLoaded);
            boot(config).await
        }
        Err(e) => Err(e),
    };
    let node = node.map_err(|e| {
        log_event(Event::BootFailed);
        tracing::error!(error = %e, "boot failed");
        e
    })?;
    node.serve().await
}

/// A booted node that has not started serving yet
pub struct Node {
    config: Config,
    role: NodeRole,
    state: Arc<NodeState>,
    scheduler: Option<Arc<JobScheduler>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Build every service of a node from its configuration
pub async fn boot(config: Config) -> CliResult<Node> {
    let role = NodeRole::from_slave_of(&config.slave_of);
    tracing::info!(id = %config.id, role = %role, "booting node");

    let store = match &role {
        NodeRole::Master => {
            let path = config.data_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            MasterStore::open(&path)?
                .with_scripts(ScriptLocator::from_env(&config.script_dir))
                .with_provisioner(Arc::new(MySqlProvisioner))
        }
        NodeRole::Slave { .. } => MasterStore::new(MasterData::default()),
    };
    let store = Arc::new(store);
    log_event(Event::MasterDataLoaded);

    let mut tasks = Vec::new();
    let connectors = Arc::new(ConnectorRegistry::new(Arc::new(MySqlFactory)));
    tasks.push(spawn_connector_pruning(&store, Arc::clone(&connectors)));

    let scheduler = if role.is_master() {
        let scheduler = Arc::new(JobScheduler::new(JobRunner::new(
            store.subscribe(),
            Arc::clone(&connectors),
        )));
        let jobs: Arc<dyn JobControl> = Arc::clone(&scheduler) as Arc<dyn JobControl>;
        store.attach_jobs(jobs);
        let started = store.start_auto_jobs();
        tracing::info!(started, "auto start jobs");
        log_event(Event::AutoJobsStarted);
        Some(scheduler)
    } else {
        None
    };

    let timeout = Duration::from_secs(config.remote_timeout_secs);
    let transport = HttpTransport::new(timeout)
        .map_err(|e| CliError::boot_failed(format!("HTTP client: {}", e)))?;
    let interceptors = Arc::new(InterceptorRegistry::with_builtins(Builtins {
        snapshots: store.subscribe(),
        sessions: Arc::new(JwtManager::new(JwtConfig::new(config.secret.clone()))),
        transport: Arc::new(transport),
        criteria: Arc::new(FieldCriteria),
        mailer: create_mailer(config.smtp.clone()),
    }));
    let operator = Arc::new(DataOperator::new(
        store.subscribe(),
        connectors,
        interceptors,
    ));

    let state = match &role {
        NodeRole::Master => {
            let hub = Arc::new(MasterHub::new(Arc::clone(&store), config.secret.clone()));
            let control = ControlPlane::master(Arc::clone(&store), hub.registry());
            NodeState::new(Arc::new(control), operator).with_hub(hub)
        }
        NodeRole::Slave { master } => {
            let upstream = ControlClient::new(master, Some(timeout))?;
            let control = ControlPlane::slave(Arc::clone(&store), upstream);
            let hello = SlaveHello {
                id: config.id.clone(),
                secret: config.secret.clone(),
            };
            let link = SlaveLink::new(master.clone(), hello, Arc::clone(&store))
                .with_reconnect_delay(Duration::from_secs(config.reconnect_delay_secs));
            tasks.push(tokio::spawn(async move { link.run().await }));
            log_event(Event::SlaveLinkStarted);
            NodeState::new(Arc::new(control), operator)
        }
    };

    Ok(Node {
        config,
        role,
        state: Arc::new(state),
        scheduler,
        tasks,
    })
}

/// Drop connectors of apps that left the configuration
fn spawn_connector_pruning(
    store: &MasterStore,
    connectors: Arc<ConnectorRegistry>,
) -> JoinHandle<()> {
    let mut snapshots = store.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let data = Arc::clone(&snapshots.borrow_and_update().data);
            connectors.retain(&data);
        }
    })
}

impl Node {
    pub fn role(&self) -> &NodeRole {
        &self.role
    }

    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured address and serve until shut down
    pub async fn serve(self) -> CliResult<()> {
        let listener = TcpListener::bind(self.config.socket_addr())
            .await
            .map_err(|e| {
                CliError::boot_failed(format!("Failed to bind {}: {}", self.config.socket_addr(), e))
            })?;
        self.serve_on(listener).await
    }

    /// Serve on a bound listener until shut down
    pub async fn serve_on(self, listener: TcpListener) -> CliResult<()> {
        let mut http = HttpServerConfig::new(self.config.host.clone(), self.config.port);
        http.cors_origins = self.config.cors_origins.clone();
        let server = HttpServer::new(http, Arc::clone(&self.state));

        let shutdown = Arc::clone(&self.state.shutdown);
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                shutdown.notify_one();
            }
        });

        log_event(Event::Serving);
        let served = server
            .serve(listener)
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)));

        log_event(Event::ShutdownStart);
        ctrl_c.abort();
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        for task in &self.tasks {
            task.abort();
        }
        log_event(Event::ShutdownComplete);
        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::ListMode;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["netgate"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    fn control_command(cmd: Command) -> ControlCommand {
        match cmd {
            Command::Job { action, .. } => job_command(action),
            Command::Token { action, .. } => token_command(action),
            Command::App { action, .. } => app_command(action),
            Command::Datanode { action, .. } => datanode_command(action),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_job_start_targets_app() {
        let command = control_command(parse(&["job", "start", "--app", "a1", "j1"]));
        let envelope = command.encode().unwrap();
        assert_eq!(envelope.tag, "CLI_JOB_START");
        match command {
            ControlCommand::StartJob(target) => {
                assert_eq!(target.id, "j1");
                assert_eq!(target.app_id, "a1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_list_carries_mode_and_app() {
        let command = control_command(parse(&["token", "list", "--compact", "--app", "a1"]));
        match command {
            ControlCommand::List { kind, mode, app_id } => {
                assert_eq!(kind, ListKind::Tokens);
                assert_eq!(mode, ListMode::Compact);
                assert_eq!(app_id.as_deref(), Some("a1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_app_update_keeps_id() {
        let command = control_command(parse(&[
            "app", "update", "a1", "--name", "shop", "--db", "shop_db", "--node", "n1",
        ]));
        match command {
            ControlCommand::UpdateApp(app) => {
                assert_eq!(app.id, "a1");
                assert_eq!(app.db_name, "shop_db");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("netgate.json");
        fs::write(&path, r#"{"secret": "from-file", "port": 2000}"#).unwrap();

        let config = load_config(ServiceArgs {
            conf_file: Some(path),
            port: Some(2001),
            slave_of: Some("10.0.0.1:1103".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.port, 2001);
        assert_eq!(config.secret, "from-file");
        assert_eq!(config.slave_of, "10.0.0.1:1103");
        assert!(!config.id.is_empty());
    }

    #[test]
    fn test_missing_secret_fails_boot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("netgate.json");
        fs::write(&path, "{}").unwrap();
        let err = load_config(ServiceArgs {
            conf_file: Some(path),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.message(), "secret must not be empty");
    }

    #[tokio::test]
    async fn test_master_boot_persists_to_data_file() {
        let dir = TempDir::new().unwrap();
        let data_file = dir.path().join("state").join("netgate_master.json");
        let config = Config {
            secret: "s".into(),
            data_file: data_file.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let node = boot(config).await.unwrap();
        assert!(node.role().is_master());
        let state = node.state();
        assert!(state.hub.is_some());

        let envelope = ControlCommand::AddDataNode(crate::master::DataNode {
            name: "d1".into(),
            host: "h".into(),
            port: 3306,
            ..Default::default()
        })
        .encode()
        .unwrap();
        assert_eq!(state.control.handle(envelope).await, "");
        let saved: MasterData =
            serde_json::from_str(&fs::read_to_string(&data_file).unwrap()).unwrap();
        assert_eq!(saved.data_nodes[0].name, "d1");
    }

    #[tokio::test]
    async fn test_slave_boot_has_no_hub() {
        let config = Config {
            secret: "s".into(),
            slave_of: "127.0.0.1:1".into(),
            ..Default::default()
        };
        let node = boot(config).await.unwrap();
        assert!(!node.role().is_master());
        assert!(node.state().hub.is_none());
        assert!(!node.state().control.is_master());
    }
}
