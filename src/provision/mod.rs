pub mod database;
pub mod filesystem;
pub mod oratab;
pub mod templates;
pub mod topology;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::types::Settings;
use filesystem::{DryRunFilesystem, Filesystem, LocalFilesystem};
use oratab::{HostRegistry, OraTab, ReadOnlyRegistry};
use templates::{TemplateRenderer, TemplateSet};

/// The collaborators provisioning hooks act through.
#[derive(Clone)]
pub struct Provisioning {
    pub settings: Settings,
    pub fs: Arc<dyn Filesystem>,
    pub registry: Arc<dyn HostRegistry>,
    pub templates: Arc<dyn TemplateRenderer>,
}

impl Provisioning {
    /// Collaborators backed by this host: local filesystem, the configured oratab, built-in
    /// templates with optional overrides.
    pub fn local(settings: Settings) -> Self {
        let fs = Arc::new(LocalFilesystem::new(settings.manage_ownership));
        let registry = Arc::new(OraTab::new(&settings.oratab));
        let templates = Arc::new(TemplateSet::new(
            settings.template_dir.as_ref().map(PathBuf::from),
        ));
        Self {
            settings,
            fs,
            registry,
            templates,
        }
    }

    /// Collaborators that read the host but only log local changes.
    pub fn dry_run(settings: Settings) -> Self {
        let registry = Arc::new(ReadOnlyRegistry::new(OraTab::new(&settings.oratab)));
        let templates = Arc::new(TemplateSet::new(
            settings.template_dir.as_ref().map(PathBuf::from),
        ));
        Self {
            settings,
            fs: Arc::new(DryRunFilesystem),
            registry,
            templates,
        }
    }
}
