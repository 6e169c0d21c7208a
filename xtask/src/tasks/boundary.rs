//! Implementation of the `boundary` command.
//!
//! The intelligence sandbox is a build-graph property: `mek-intelligence`
//! must have no dependency edge into `mek-kernel`. This command checks two
//! surfaces and fails on either:
//!
//! 1. The crate manifest: no dependency table entry may name the kernel
//!    crate (regular, dev, or build dependencies).
//! 2. The source tree: no `.rs` file may reference the `mek_kernel` crate
//!    path.
//!
//! Findings are reported as hard errors; there is no allowlist.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Crate that must stay sandboxed.
const SANDBOXED_CRATE: &str = "crates/mek-intelligence";

/// Dependency names the sandboxed crate may never declare.
const FORBIDDEN_DEPENDENCIES: &[&str] = &["mek-kernel"];

/// Source tokens that betray a kernel edge.
const FORBIDDEN_SOURCE_TOKENS: &[&str] = &["mek_kernel"];

/// A boundary violation with location information.
#[derive(Debug)]
struct Violation {
    file: PathBuf,
    line_number: usize,
    line: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "error: kernel edge from sandboxed crate\n  --> {}:{}\n  |\n  | {}",
            self.file.display(),
            self.line_number,
            self.line.trim_end()
        )
    }
}

/// Run the boundary check from the workspace root.
///
/// # Errors
///
/// Returns an error when the workspace layout is unreadable or when any
/// boundary violation is found.
pub fn run() -> Result<()> {
    let root = workspace_root()?;
    let crate_dir = root.join(SANDBOXED_CRATE);

    let mut violations = Vec::new();
    violations.extend(check_manifest(&crate_dir.join("Cargo.toml"))?);
    violations.extend(check_sources(&crate_dir.join("src"))?);

    if violations.is_empty() {
        println!("boundary: ok ({SANDBOXED_CRATE} has no kernel edge)");
        return Ok(());
    }
    for violation in &violations {
        eprintln!("{violation}");
    }
    bail!("{} boundary violation(s) found", violations.len());
}

fn workspace_root() -> Result<PathBuf> {
    // xtask always runs from within the workspace; walk up to the root
    // manifest that declares [workspace].
    let mut dir = std::env::current_dir().context("read current directory")?;
    loop {
        let manifest = dir.join("Cargo.toml");
        if manifest.is_file() {
            let contents = std::fs::read_to_string(&manifest)
                .with_context(|| format!("read {}", manifest.display()))?;
            if contents.contains("[workspace]") {
                return Ok(dir);
            }
        }
        if !dir.pop() {
            bail!("workspace root not found above the current directory");
        }
    }
}

/// Scan the sandboxed crate's manifest for forbidden dependency names.
fn check_manifest(manifest: &Path) -> Result<Vec<Violation>> {
    let contents = std::fs::read_to_string(manifest)
        .with_context(|| format!("read {}", manifest.display()))?;
    let mut violations = Vec::new();
    let mut in_dependency_table = false;
    for (index, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_dependency_table = trimmed.contains("dependencies");
            continue;
        }
        if !in_dependency_table {
            continue;
        }
        let key = trimmed.split(['=', ' ', '.']).next().unwrap_or_default();
        if FORBIDDEN_DEPENDENCIES.contains(&key.trim_matches('"')) {
            violations.push(Violation {
                file: manifest.to_path_buf(),
                line_number: index + 1,
                line: line.to_string(),
            });
        }
    }
    Ok(violations)
}

/// Scan the sandboxed crate's sources for kernel references.
fn check_sources(src: &Path) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for file in rust_files(src)? {
        let contents =
            std::fs::read_to_string(&file).with_context(|| format!("read {}", file.display()))?;
        for (index, line) in contents.lines().enumerate() {
            if FORBIDDEN_SOURCE_TOKENS
                .iter()
                .any(|token| line.contains(token))
            {
                violations.push(Violation {
                    file: file.clone(),
                    line_number: index + 1,
                    line: line.to_string(),
                });
            }
        }
    }
    Ok(violations)
}

fn rust_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in
            std::fs::read_dir(&dir).with_context(|| format!("read directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
