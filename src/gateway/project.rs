//! Locating the function to generate for inside a project tree.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::gateway::store::FunctionFile;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target"];

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&&*name)
}

/// Every readable function config under `root`, in path order.
/// Files that fail to parse are logged and skipped.
pub fn function_files(root: &Path) -> Result<Vec<FunctionFile>> {
    if !root.is_dir() {
        bail!("Project root {} is not a directory", root.display());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e));
    for entry in walker {
        let entry = entry.with_context(|| format!("Walking {}", root.display()))?;
        if !entry.file_type().is_file() || !FunctionFile::is_function_file(entry.path()) {
            continue;
        }
        match FunctionFile::load(entry.path()) {
            Ok(file) => {
                debug!(file = %entry.path().display(), name = ?file.name(), "found function");
                files.push(file);
            }
            Err(e) => warn!(file = %entry.path().display(), error = %e, "skipping unreadable function config"),
        }
    }
    Ok(files)
}

/// Pick the function to generate for.
///
/// With `name`, the function of that name. Without it, the single function
/// that carries a `custom.lambdefy` attribute.
pub fn find_application(root: &Path, name: Option<&str>) -> Result<FunctionFile> {
    let files = function_files(root)?;

    if let Some(name) = name {
        return files
            .into_iter()
            .find(|f| f.name() == Some(name))
            .with_context(|| format!("No function named '{}' in project {}", name, root.display()));
    }

    let mut tagged = files.into_iter().filter(FunctionFile::has_custom);
    let Some(first) = tagged.next() else {
        bail!("no functions in this project contain a lambdefy attribute");
    };
    if let Some(second) = tagged.next() {
        bail!(
            "only one function in a project can contain a lambdefy attribute (found {} and {})",
            first.path().display(),
            second.path().display()
        );
    }
    Ok(first)
}

/// The function config in `dir` itself, for runs from inside a function folder.
pub fn function_in_dir(dir: &Path) -> Result<PathBuf> {
    for ext in ["json", "yaml", "yml", "toml"] {
        let candidate = dir.join(format!("s-function.{ext}"));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    bail!("You must be in a function folder to run this command (no s-function file in {})", dir.display())
}
