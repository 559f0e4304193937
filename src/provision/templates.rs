use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use tera::{Context, Tera};

/// Renders named script templates. Rendering has no side effects.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Context) -> Result<String>;
}

/// Bootstrap scripts run after database creation when the catalog is populated.
pub const BOOTSTRAP_SCRIPTS: [&str; 9] = [
    "CreateDBCatalog.sql",
    "JServer.sql",
    "Context.sql",
    "Xdb_protocol.sql",
    "Cwmlite.sql",
    "CreateClustDBViews.sql",
    "Grants.sql",
    "LockAccount.sql",
    "Psu.sql",
];

pub const CREATE_SCRIPT: &str = "create.sql";
pub const DESTROY_SCRIPT: &str = "destroy.sql";
pub const RAC_POST_CREATE_SCRIPT: &str = "rac_post_create_actions.sql";

/// Shared macros, importable from any script as `{% import "macros.sql" as m %}`.
pub const MACROS: &str = "macros.sql";

fn builtin(template: &str) -> Option<&'static str> {
    let content = match template {
        "macros.sql" => include_str!("../../templates/macros.sql.tmpl"),
        "create.sql" => include_str!("../../templates/create.sql.tmpl"),
        "destroy.sql" => include_str!("../../templates/destroy.sql.tmpl"),
        "rac_post_create_actions.sql" => {
            include_str!("../../templates/rac_post_create_actions.sql.tmpl")
        }
        "CreateDBCatalog.sql" => include_str!("../../templates/CreateDBCatalog.sql.tmpl"),
        "JServer.sql" => include_str!("../../templates/JServer.sql.tmpl"),
        "Context.sql" => include_str!("../../templates/Context.sql.tmpl"),
        "Xdb_protocol.sql" => include_str!("../../templates/Xdb_protocol.sql.tmpl"),
        "Cwmlite.sql" => include_str!("../../templates/Cwmlite.sql.tmpl"),
        "CreateClustDBViews.sql" => include_str!("../../templates/CreateClustDBViews.sql.tmpl"),
        "Grants.sql" => include_str!("../../templates/Grants.sql.tmpl"),
        "LockAccount.sql" => include_str!("../../templates/LockAccount.sql.tmpl"),
        "Psu.sql" => include_str!("../../templates/Psu.sql.tmpl"),
        _ => return None,
    };
    Some(content)
}

/// Built-in Tera templates, optionally overridden by `<dir>/<template>.tmpl` files.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    override_dir: Option<PathBuf>,
}

impl TemplateSet {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    fn source(&self, template: &str) -> Result<String> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.tmpl", template));
            if path.is_file() {
                tracing::debug!(template, path = %path.display(), "Using template override");
                return std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read template {}", path.display()));
            }
        }
        match builtin(template) {
            Some(content) => Ok(content.to_string()),
            None => bail!("Unknown template '{}'", template),
        }
    }
}

impl TemplateRenderer for TemplateSet {
    fn render(&self, template: &str, context: &Context) -> Result<String> {
        let mut tera = Tera::default();
        let mut sources = vec![(MACROS.to_string(), self.source(MACROS)?)];
        if template != MACROS {
            sources.push((template.to_string(), self.source(template)?));
        }
        tera.add_raw_templates(sources)
            .with_context(|| format!("Failed to parse template '{}'", template))?;
        tera.render(template, context)
            .with_context(|| format!("Failed to render template '{}'", template))
    }
}
