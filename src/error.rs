use thiserror::Error;

/// Errors surfaced by the reconciliation core.
///
/// Every variant names the resource it concerns and keeps the original cause text.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("malformed title '{title}': no usable match for pattern {pattern}")]
    MalformedTitle { title: String, pattern: String },

    #[error("state discovery unavailable for {resource_type}: {cause}")]
    DiscoveryUnavailable {
        resource_type: String,
        cause: String,
    },

    #[error("{operation} of {resource} is not supported: {reason}")]
    UnsupportedOperation {
        resource: String,
        operation: String,
        reason: String,
    },

    #[error("failed to provision {resource}: {cause}")]
    ProvisioningFailed { resource: String, cause: String },

    #[error("command failed on instance {instance} for {resource}: {message}")]
    CommandExecutionFailed {
        resource: String,
        instance: String,
        command: String,
        message: String,
    },

    #[error("invalid declaration {resource}: {reason}")]
    InvalidDeclaration { resource: String, reason: String },

    #[error("resource {resource} is locked: {cause}")]
    Locked { resource: String, cause: String },
}

impl ProvisionError {
    /// Whether the caller may reasonably retry the failed operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DiscoveryUnavailable { .. } | Self::Locked { .. })
    }

    /// The resource identity the error concerns.
    pub fn resource(&self) -> &str {
        match self {
            Self::MalformedTitle { title, .. } => title,
            Self::DiscoveryUnavailable { resource_type, .. } => resource_type,
            Self::UnsupportedOperation { resource, .. }
            | Self::ProvisioningFailed { resource, .. }
            | Self::CommandExecutionFailed { resource, .. }
            | Self::InvalidDeclaration { resource, .. }
            | Self::Locked { resource, .. } => resource,
        }
    }

    pub(crate) fn unsupported(resource: &str, operation: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            resource: resource.to_string(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(resource: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}

/// Render an error and all of its causes on one line.
pub fn cause_text(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
