//! # Listings
//!
//! Plain-text listings returned to the CLI by the `*_LIST` commands.
//!
//! - `compact`: `"name "` per entry
//! - `full`: `"name detail\n"` per entry
//! - anything else: `"name\n"` per entry

use std::fmt::Write;

use super::model::{ApiNode, App, MasterData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    Compact,
    Full,
    #[default]
    Normal,
}

impl ListMode {
    pub fn parse(mode: &str) -> Self {
        match mode.trim() {
            "compact" => ListMode::Compact,
            "full" => ListMode::Full,
            _ => ListMode::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListMode::Compact => "compact",
            ListMode::Full => "full",
            ListMode::Normal => "normal",
        }
    }
}

/// Entity kinds that can be listed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    DataNodes,
    Apps,
    Queries,
    Jobs,
    Tokens,
    LocalInterceptors,
    RemoteInterceptors,
}

fn render<'a>(mode: ListMode, entries: impl Iterator<Item = (&'a str, String)>) -> String {
    let mut out = String::new();
    for (name, detail) in entries {
        // Writing to a String cannot fail
        let _ = match mode {
            ListMode::Compact => write!(out, "{} ", name),
            ListMode::Full => writeln!(out, "{} {}", name, detail),
            ListMode::Normal => writeln!(out, "{}", name),
        };
    }
    out
}

fn scoped_apps<'a>(data: &'a MasterData, app_id: Option<&'a str>) -> impl Iterator<Item = &'a App> {
    data.apps
        .iter()
        .filter(move |a| app_id.map_or(true, |id| id.is_empty() || a.id == id))
}

/// Render a listing of `kind`, limited to one app when `app_id` is given
pub fn list(data: &MasterData, kind: ListKind, mode: ListMode, app_id: Option<&str>) -> String {
    match kind {
        ListKind::DataNodes => render(
            mode,
            data.data_nodes.iter().map(|d| (d.name.as_str(), d.host.clone())),
        ),
        ListKind::Apps => render(
            mode,
            data.apps.iter().map(|a| {
                let node = data
                    .data_node(&a.data_node_id)
                    .map(|d| d.name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| a.data_node_id.clone());
                (a.name.as_str(), node)
            }),
        ),
        ListKind::Queries => render(
            mode,
            scoped_apps(data, app_id)
                .flat_map(|a| a.queries.iter())
                .map(|q| (q.name.as_str(), q.script_path.clone())),
        ),
        ListKind::Jobs => render(
            mode,
            scoped_apps(data, app_id)
                .flat_map(|a| a.jobs.iter())
                .map(|j| (j.name.as_str(), j.cron.clone())),
        ),
        ListKind::Tokens => render(
            mode,
            scoped_apps(data, app_id)
                .flat_map(|a| a.tokens.iter())
                .map(|t| (t.name.as_str(), format!("{} {}", t.mode, t.target))),
        ),
        ListKind::LocalInterceptors => render(
            mode,
            scoped_apps(data, app_id)
                .flat_map(|a| a.local_interceptors.iter())
                .map(|i| (i.name.as_str(), i.target.clone())),
        ),
        ListKind::RemoteInterceptors => render(
            mode,
            scoped_apps(data, app_id)
                .flat_map(|a| a.remote_interceptors.iter())
                .map(|i| (i.name.as_str(), i.url.clone())),
        ),
    }
}

/// Connected slaves, keyed by id with the remote address as detail
pub fn list_api_nodes(nodes: &[ApiNode], mode: ListMode) -> String {
    render(mode, nodes.iter().map(|n| (n.id.as_str(), n.name.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::model::{DataNode, Query};

    fn data() -> MasterData {
        MasterData {
            data_nodes: vec![DataNode {
                id: "n1".into(),
                name: "d1".into(),
                host: "h".into(),
                port: 3306,
                ..Default::default()
            }],
            apps: vec![
                App {
                    id: "x".into(),
                    name: "a1".into(),
                    data_node_id: "n1".into(),
                    queries: vec![Query {
                        name: "orders".into(),
                        app_id: "x".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                App {
                    id: "y".into(),
                    name: "a2".into(),
                    data_node_id: "gone".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_list_modes() {
        let d = data();
        assert_eq!(list(&d, ListKind::DataNodes, ListMode::Compact, None), "d1 ");
        assert_eq!(list(&d, ListKind::DataNodes, ListMode::Full, None), "d1 h\n");
        assert_eq!(list(&d, ListKind::Apps, ListMode::Normal, None), "a1\na2\n");
    }

    #[test]
    fn test_full_app_listing_falls_back_to_node_id() {
        assert_eq!(
            list(&data(), ListKind::Apps, ListMode::Full, None),
            "a1 d1\na2 gone\n"
        );
    }

    #[test]
    fn test_app_scoped_listing() {
        let d = data();
        assert_eq!(list(&d, ListKind::Queries, ListMode::Compact, Some("x")), "orders ");
        assert_eq!(list(&d, ListKind::Queries, ListMode::Compact, Some("y")), "");
        assert_eq!(list(&d, ListKind::Queries, ListMode::Compact, None), "orders ");
    }

    #[test]
    fn test_unknown_mode_is_normal() {
        assert_eq!(ListMode::parse("verbose"), ListMode::Normal);
    }
}
