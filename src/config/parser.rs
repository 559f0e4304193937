use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{Manifest, Settings};
use crate::resources::Declaration;

/// Default manifest path used by the CLI.
pub const DEFAULT_MANIFEST: &str = "oraprov.yaml";

/// The on-disk shape of one manifest file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    settings: Option<Settings>,
    #[serde(default)]
    resources: Vec<serde_yaml::Value>,
}

/// Load a manifest by auto-discovering yaml files.
///
/// - If `path` is a `.yaml`/`.yml` file, load just that file.
/// - If `path` is a directory, discover and merge all `*.yaml`/`*.yml` files in it.
/// - If `path` is the default `oraprov.yaml` and doesn't exist, scan the current directory.
pub fn load_manifest(path: &str) -> Result<Manifest> {
    let p = Path::new(path);

    if p.is_file() {
        let content = fs::read_to_string(p)
            .with_context(|| format!("Failed to read manifest: {}", path))?;
        return parse_manifest(&content).with_context(|| format!("Invalid manifest: {}", path));
    }

    if p.is_dir() {
        return load_from_directory(p);
    }

    if path == DEFAULT_MANIFEST && !p.exists() {
        let yamls = find_yaml_files(Path::new("."))?;
        if !yamls.is_empty() {
            return merge_yaml_files(&yamls);
        }
    }

    bail!(
        "Manifest not found: '{}'. Place .yaml files in the current directory or specify a path with -c",
        path
    )
}

/// Parse a single manifest document.
pub fn parse_manifest(content: &str) -> Result<Manifest> {
    let file: ManifestFile = serde_yaml::from_str(content).context("Failed to parse YAML")?;
    Ok(Manifest {
        settings: file.settings.unwrap_or_default(),
        resources: parse_resources(file.resources)?,
    })
}

fn parse_resources(values: Vec<serde_yaml::Value>) -> Result<Vec<Declaration>> {
    values
        .into_iter()
        .enumerate()
        .map(|(idx, value)| {
            Declaration::from_value(value).with_context(|| format!("resources[{}]", idx))
        })
        .collect()
}

fn load_from_directory(dir: &Path) -> Result<Manifest> {
    let yamls = find_yaml_files(dir)?;
    if yamls.is_empty() {
        bail!("No .yaml files found in directory: {}", dir.display());
    }
    merge_yaml_files(&yamls)
}

/// Find all .yaml/.yml files in a directory (non-recursive), sorted by name.
fn find_yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Merge several manifest files.
///
/// Settings come from the first file that defines them; resources are concatenated in file
/// order.
fn merge_yaml_files(files: &[PathBuf]) -> Result<Manifest> {
    tracing::info!(
        files = ?files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>(),
        "Discovered manifest files"
    );

    let mut merged_settings: Option<Settings> = None;
    let mut merged_resources = Vec::new();

    for file in files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read manifest: {}", file.display()))?;
        let parsed: ManifestFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", file.display()))?;

        if merged_settings.is_none() {
            merged_settings = parsed.settings;
        }
        let resources = parse_resources(parsed.resources)
            .with_context(|| format!("Invalid manifest: {}", file.display()))?;
        merged_resources.extend(resources);
    }

    Ok(Manifest {
        settings: merged_settings.unwrap_or_default(),
        resources: merged_resources,
    })
}
