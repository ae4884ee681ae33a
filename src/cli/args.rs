//! CLI argument definitions using clap
//!
//! Commands:
//! - netgate service start [--slaveof host:port] [--conf-file <path>] ...
//! - netgate service stop [port]
//! - netgate datanode|app|query|job|token|li|ri list|add|update|remove ...
//! - netgate job start|stop|restart --app <id> <id>
//! - netgate apinode list
//! - netgate master show
//!
//! Every configuration command talks to the node at `--master`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::http_server::DEFAULT_PORT;
use crate::master::{
    App, DataNode, DataNodePatch, EntityRef, HookDirection, Job, ListMode, LocalInterceptor,
    Query, QueryPatch, RemoteInterceptor, Token,
};

pub const DEFAULT_MASTER: &str = "127.0.0.1:1103";

/// netgate - multi-tenant SQL gateway
#[derive(Parser, Debug)]
#[command(name = "netgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run or stop a gateway node
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Manage data nodes
    #[command(visible_alias = "dn")]
    Datanode {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: DataNodeAction,
    },

    /// Manage apps
    App {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: AppAction,
    },

    /// Manage named queries
    #[command(visible_alias = "q")]
    Query {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Manage scheduled jobs
    Job {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: JobAction,
    },

    /// Manage access tokens
    Token {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Manage local interceptors
    #[command(name = "li")]
    LocalInterceptor {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: LocalInterceptorAction,
    },

    /// Manage remote interceptors
    #[command(name = "ri")]
    RemoteInterceptor {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: RemoteInterceptorAction,
    },

    /// Connected slaves
    #[command(visible_alias = "an")]
    Apinode {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: ApiNodeAction,
    },

    /// Whole master configuration
    Master {
        #[command(flatten)]
        remote: Remote,
        #[command(subcommand)]
        action: MasterAction,
    },
}

/// Node the command is sent to
#[derive(Args, Debug, Clone)]
pub struct Remote {
    /// Node address, `host:port`
    #[arg(short, long, global = true, default_value = DEFAULT_MASTER)]
    pub master: String,
}

// ==================
// Service
// ==================

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    /// Boot a node and serve until shut down
    Start(ServiceArgs),

    /// Ask the local node on `port` to shut down
    Stop {
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

/// Flags override the configuration file
#[derive(Args, Debug, Clone, Default)]
pub struct ServiceArgs {
    /// Node id
    #[arg(long)]
    pub id: Option<String>,

    /// Run as a slave of the master at `host:port`
    #[arg(long = "slaveof")]
    pub slave_of: Option<String>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// Configuration file
    #[arg(long = "conf-file")]
    pub conf_file: Option<PathBuf>,

    /// Master data file
    #[arg(long = "data-file")]
    pub data_file: Option<String>,

    /// Script directory name
    #[arg(long = "script-dir")]
    pub script_dir: Option<String>,

    /// Shared secret
    #[arg(long)]
    pub secret: Option<String>,
}

// ==================
// Listing
// ==================

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Include details
    #[arg(long)]
    pub full: bool,

    /// Names only, on one line
    #[arg(long, conflicts_with = "full")]
    pub compact: bool,

    /// Restrict to one app
    #[arg(long)]
    pub app: Option<String>,
}

impl ListArgs {
    pub fn mode(&self) -> ListMode {
        if self.full {
            ListMode::Full
        } else if self.compact {
            ListMode::Compact
        } else {
            ListMode::Normal
        }
    }
}

/// An app-owned entity
#[derive(Args, Debug, Clone)]
pub struct RefArgs {
    /// Owning app id
    #[arg(long)]
    pub app: String,

    pub id: String,
}

impl From<RefArgs> for EntityRef {
    fn from(args: RefArgs) -> Self {
        EntityRef {
            id: args.id,
            app_id: args.app,
        }
    }
}

// ==================
// Data nodes
// ==================

#[derive(Subcommand, Debug)]
pub enum DataNodeAction {
    List(ListArgs),
    Add(DataNodeArgs),
    Update(DataNodeUpdateArgs),
    Remove { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct DataNodeArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub host: String,
    #[arg(long, default_value_t = 3306)]
    pub port: u16,
    #[arg(short, long, default_value = "")]
    pub username: String,
    #[arg(long, default_value = "")]
    pub password: String,
    /// Engine type
    #[arg(long = "type", default_value = "mysql")]
    pub engine: String,
    #[arg(long, default_value = "")]
    pub note: String,
}

impl From<DataNodeArgs> for DataNode {
    fn from(args: DataNodeArgs) -> Self {
        DataNode {
            name: args.name,
            host: args.host,
            port: args.port,
            username: args.username,
            password: args.password,
            engine: args.engine,
            note: args.note,
            ..Default::default()
        }
    }
}

/// Only the given flags change
#[derive(Args, Debug, Clone)]
pub struct DataNodeUpdateArgs {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(short, long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
}

impl From<DataNodeUpdateArgs> for DataNodePatch {
    fn from(args: DataNodeUpdateArgs) -> Self {
        DataNodePatch {
            id: args.id,
            name: args.name,
            username: args.username,
            password: args.password,
            host: args.host,
            port: args.port,
            note: args.note,
            status: args.status,
        }
    }
}

// ==================
// Apps
// ==================

#[derive(Subcommand, Debug)]
pub enum AppAction {
    List(ListArgs),
    Add(AppArgs),
    /// Replace an app's own fields; its children are kept
    Update {
        id: String,
        #[command(flatten)]
        app: AppArgs,
    },
    Remove { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct AppArgs {
    #[arg(long)]
    pub name: String,
    /// Tenant database name
    #[arg(long = "db")]
    pub db_name: String,
    /// Hosting data node id
    #[arg(long = "node")]
    pub data_node_id: String,
    #[arg(long, default_value = "")]
    pub note: String,
    #[arg(long, default_value = "")]
    pub status: String,
}

impl AppArgs {
    pub fn into_app(self, id: String) -> App {
        App {
            id,
            name: self.name,
            db_name: self.db_name,
            data_node_id: self.data_node_id,
            note: self.note,
            status: self.status,
            ..Default::default()
        }
    }
}

// ==================
// Queries
// ==================

#[derive(Subcommand, Debug)]
pub enum QueryAction {
    List(ListArgs),
    Add(QueryArgs),
    Update(QueryUpdateArgs),
    Remove(RefArgs),
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long)]
    pub app: String,
    #[arg(long)]
    pub name: String,
    /// Script file, resolved on the master
    #[arg(long = "script", default_value = "")]
    pub script_path: String,
    /// Inline SQL
    #[arg(long = "sql", default_value = "")]
    pub script_text: String,
    #[arg(long, default_value = "")]
    pub note: String,
}

impl From<QueryArgs> for Query {
    fn from(args: QueryArgs) -> Self {
        Query {
            name: args.name,
            script_path: args.script_path,
            script_text: args.script_text,
            app_id: args.app,
            note: args.note,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryUpdateArgs {
    #[arg(long)]
    pub app: String,
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long = "script")]
    pub script_path: Option<String>,
    #[arg(long = "sql")]
    pub script_text: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
}

impl From<QueryUpdateArgs> for QueryPatch {
    fn from(args: QueryUpdateArgs) -> Self {
        QueryPatch {
            id: args.id,
            app_id: args.app,
            name: args.name,
            script_path: args.script_path,
            script_text: args.script_text,
            note: args.note,
            status: args.status,
        }
    }
}

// ==================
// Jobs
// ==================

#[derive(Subcommand, Debug)]
pub enum JobAction {
    List(ListArgs),
    Add(JobArgs),
    Update {
        id: String,
        #[command(flatten)]
        job: JobArgs,
    },
    Remove(RefArgs),
    Start(RefArgs),
    Stop(RefArgs),
    Restart(RefArgs),
}

#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    #[arg(long)]
    pub app: String,
    #[arg(long)]
    pub name: String,
    /// Cron expression, seconds field optional
    #[arg(long)]
    pub cron: String,
    #[arg(long = "script", default_value = "")]
    pub script_path: String,
    #[arg(long = "sql", default_value = "")]
    pub script_text: String,
    /// Start with the master
    #[arg(long)]
    pub auto_start: bool,
    /// Script repeated while it returns rows
    #[arg(long = "loop-script", default_value = "")]
    pub loop_script_path: String,
    #[arg(long = "loop-sql", default_value = "")]
    pub loop_script_text: String,
    #[arg(long, default_value = "")]
    pub note: String,
}

impl JobArgs {
    pub fn into_job(self, id: String) -> Job {
        Job {
            id,
            name: self.name,
            cron: self.cron,
            script_path: self.script_path,
            script_text: self.script_text,
            auto_start: self.auto_start,
            loop_script_path: self.loop_script_path,
            loop_script_text: self.loop_script_text,
            app_id: self.app,
            note: self.note,
            ..Default::default()
        }
    }
}

// ==================
// Tokens
// ==================

#[derive(Subcommand, Debug)]
pub enum TokenAction {
    List(ListArgs),
    /// Grant access; the token string is generated unless `--id` is given
    Add {
        #[arg(long)]
        id: Option<String>,
        #[command(flatten)]
        token: TokenArgs,
    },
    Update {
        id: String,
        #[command(flatten)]
        token: TokenArgs,
    },
    Remove(RefArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TokenArgs {
    #[arg(long)]
    pub app: String,
    #[arg(long)]
    pub name: String,
    /// Operation letters: r, w, x
    #[arg(long, default_value = "r")]
    pub mode: String,
    /// Comma separated resources, or `*`
    #[arg(long, default_value = "*")]
    pub target: String,
    #[arg(long, default_value = "")]
    pub note: String,
}

impl TokenArgs {
    pub fn into_token(self, id: String) -> Token {
        Token {
            id,
            name: self.name,
            mode: self.mode,
            target: self.target,
            app_id: self.app,
            note: self.note,
            ..Default::default()
        }
    }
}

// ==================
// Interceptors
// ==================

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum Direction {
    #[default]
    Before,
    After,
}

impl From<Direction> for HookDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Before => HookDirection::Before,
            Direction::After => HookDirection::After,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum LocalInterceptorAction {
    List(ListArgs),
    Add(LocalInterceptorArgs),
    Update {
        id: String,
        #[command(flatten)]
        interceptor: LocalInterceptorArgs,
    },
    Remove(RefArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HookArgs {
    #[arg(long)]
    pub app: String,
    #[arg(long)]
    pub name: String,
    /// Resource name, or `*`
    #[arg(long, default_value = "*")]
    pub target: String,
    #[arg(long = "type", value_enum, default_value_t = Direction::Before)]
    pub direction: Direction,
    /// Operation action, empty for all
    #[arg(long = "action", default_value = "")]
    pub action_type: String,
    #[arg(long, default_value = "")]
    pub criteria: String,
    #[arg(long, default_value = "")]
    pub note: String,
}

#[derive(Args, Debug, Clone)]
pub struct LocalInterceptorArgs {
    #[command(flatten)]
    pub hook: HookArgs,
    /// Query name, or a builtin
    #[arg(long)]
    pub callback: String,
}

impl LocalInterceptorArgs {
    pub fn into_interceptor(self, id: String) -> LocalInterceptor {
        let hook = self.hook;
        LocalInterceptor {
            id,
            name: hook.name,
            app_id: hook.app,
            target: hook.target,
            direction: hook.direction.into(),
            action_type: hook.action_type,
            criteria: hook.criteria,
            callback: self.callback,
            note: hook.note,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum RemoteInterceptorAction {
    List(ListArgs),
    Add(RemoteInterceptorArgs),
    Update {
        id: String,
        #[command(flatten)]
        interceptor: RemoteInterceptorArgs,
    },
    Remove(RefArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RemoteInterceptorArgs {
    #[command(flatten)]
    pub hook: HookArgs,
    #[arg(long, default_value = "POST")]
    pub method: String,
    #[arg(long)]
    pub url: String,
    /// Query replaying the response rows
    #[arg(long, default_value = "")]
    pub callback: String,
}

impl RemoteInterceptorArgs {
    pub fn into_interceptor(self, id: String) -> RemoteInterceptor {
        let hook = self.hook;
        RemoteInterceptor {
            id,
            name: hook.name,
            app_id: hook.app,
            target: hook.target,
            method: self.method,
            url: self.url,
            direction: hook.direction.into(),
            action_type: hook.action_type,
            criteria: hook.criteria,
            callback: self.callback,
            note: hook.note,
            ..Default::default()
        }
    }
}

// ==================
// Read-only
// ==================

#[derive(Subcommand, Debug)]
pub enum ApiNodeAction {
    List(ListArgs),
}

#[derive(Subcommand, Debug)]
pub enum MasterAction {
    /// Print the current configuration as JSON
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_datanode_add() {
        let cli = Cli::try_parse_from([
            "netgate", "dn", "add", "--name", "d1", "--host", "10.0.0.5", "-m", "10.0.0.1:1103",
        ])
        .unwrap();
        match cli.command {
            Command::Datanode {
                remote,
                action: DataNodeAction::Add(args),
            } => {
                assert_eq!(remote.master, "10.0.0.1:1103");
                let node = DataNode::from(args);
                assert_eq!(node.port, 3306);
                assert_eq!(node.engine, "mysql");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_list_modes() {
        let cli = Cli::try_parse_from(["netgate", "q", "list", "--full", "--app", "a1"]).unwrap();
        match cli.command {
            Command::Query {
                remote,
                action: QueryAction::List(args),
            } => {
                assert_eq!(remote.master, DEFAULT_MASTER);
                assert_eq!(args.mode(), ListMode::Full);
                assert_eq!(args.app.as_deref(), Some("a1"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["netgate", "app", "list", "--full", "--compact"]).is_err());
    }

    #[test]
    fn test_service_start_flags() {
        let cli = Cli::try_parse_from([
            "netgate",
            "--log-json",
            "service",
            "start",
            "--slaveof",
            "10.0.0.1:1103",
            "--port",
            "1104",
        ])
        .unwrap();
        assert!(cli.log_json);
        match cli.command {
            Command::Service {
                action: ServiceAction::Start(args),
            } => {
                assert_eq!(args.slave_of.as_deref(), Some("10.0.0.1:1103"));
                assert_eq!(args.port, Some(1104));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interceptor_direction() {
        let cli = Cli::try_parse_from([
            "netgate", "li", "add", "--app", "a1", "--name", "audit", "--type", "after",
            "--callback", "log_write",
        ])
        .unwrap();
        match cli.command {
            Command::LocalInterceptor {
                action: LocalInterceptorAction::Add(args),
                ..
            } => {
                let li = args.into_interceptor(String::new());
                assert_eq!(li.direction, HookDirection::After);
                assert_eq!(li.target, "*");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
