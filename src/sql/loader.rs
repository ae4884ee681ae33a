//! # Script Loader
//!
//! Resolves the text of a query or job script. A configured path is read
//! as-is; inline text is used verbatim; otherwise the script is looked up
//! by name under `<base>/<app name>/` in the home directory and then the
//! working directory, with and without a `.sql` extension.

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{SqlError, SqlResult};

/// Default directory name holding per-app scripts
pub const DEFAULT_SCRIPT_DIR: &str = ".netgate";

/// A located script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    /// File the text came from; empty for inline scripts
    pub path: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptLocator {
    roots: Vec<PathBuf>,
}

impl ScriptLocator {
    /// Search `<root>/<app>/` for every root, first match wins
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Home directory first, then the working directory
    pub fn from_env(script_dir: &str) -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let cwd = std::env::current_dir().ok();
        let roots = [home, cwd]
            .into_iter()
            .flatten()
            .map(|base| base.join(script_dir))
            .collect();
        Self { roots }
    }

    pub fn resolve(
        &self,
        app_name: &str,
        name: &str,
        path: &str,
        text: &str,
    ) -> SqlResult<ResolvedScript> {
        if !path.is_empty() {
            return read(Path::new(path));
        }
        if !text.is_empty() {
            return Ok(ResolvedScript {
                path: String::new(),
                text: text.to_string(),
            });
        }
        self.candidates(app_name, name)
            .find(|p| p.is_file())
            .map(|p| read(&p))
            .unwrap_or_else(|| Err(SqlError::ScriptNotFound(name.to_string())))
    }

    fn candidates<'a>(&'a self, app_name: &'a str, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        self.roots.iter().flat_map(move |root| {
            let dir = root.join(app_name);
            [dir.join(name), dir.join(format!("{}.sql", name))]
        })
    }
}

fn read(path: &Path) -> SqlResult<ResolvedScript> {
    let text = fs::read_to_string(path)
        .map_err(|_| SqlError::ScriptUnreadable(path.display().to_string()))?;
    Ok(ResolvedScript {
        path: path.display().to_string(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inline_text_wins_without_path() {
        let locator = ScriptLocator::new(vec![]);
        let script = locator.resolve("shop", "q", "", "SELECT 1").unwrap();
        assert_eq!(script.text, "SELECT 1");
        assert!(script.path.is_empty());
    }

    #[test]
    fn test_lookup_by_name_with_sql_extension() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("shop")).unwrap();
        fs::write(dir.path().join("shop/orders.sql"), "SELECT * FROM orders").unwrap();

        let locator = ScriptLocator::new(vec![dir.path().to_path_buf()]);
        let script = locator.resolve("shop", "orders", "", "").unwrap();
        assert_eq!(script.text, "SELECT * FROM orders");
        assert!(script.path.ends_with("orders.sql"));
    }

    #[test]
    fn test_missing_script() {
        let locator = ScriptLocator::new(vec![]);
        assert!(matches!(
            locator.resolve("shop", "nope", "", ""),
            Err(SqlError::ScriptNotFound(_))
        ));
        assert!(matches!(
            locator.resolve("shop", "nope", "/does/not/exist.sql", ""),
            Err(SqlError::ScriptUnreadable(_))
        ));
    }
}
