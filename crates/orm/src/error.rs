//! Error types for the ORM core
//!
//! Every failure a caller can observe is an [`OrmError`]. The variants follow
//! a fixed taxonomy:
//!
//! - `Usage`: the caller supplied structurally invalid input (records,
//!   criteria, metadata, or a model/index/edge definition). Never retried.
//! - `Adapter`: the storage adapter rejected or failed the operation. The
//!   adapter's own error shape is translated before it reaches the caller.
//! - `Configuration`: a setup defect such as a missing datastore or an adapter
//!   that does not implement the requested operation.
//! - `Lifecycle`: a "before" lifecycle callback refused the operation.
//!
//! A no-op is not an error; see [`crate::query::Normalized::NoOp`].

use std::fmt;

use thiserror::Error;

use crate::adapters::AdapterError;
use crate::config::ConfigError;
use crate::context::QueryContext;
use crate::lifecycle::{HookError, HookKind};

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Stable codes carried by usage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageCode {
    InvalidNewRecords,
    InvalidCriteria,
    InvalidValuesToSet,
    InvalidMeta,
    InvalidModelDefinition,
    InvalidAttribute,
    InvalidIndex,
    InvalidEdgeDefinition,
    InvalidTenantType,
}

impl UsageCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCode::InvalidNewRecords => "E_INVALID_NEW_RECORDS",
            UsageCode::InvalidCriteria => "E_INVALID_CRITERIA",
            UsageCode::InvalidValuesToSet => "E_INVALID_VALUES_TO_SET",
            UsageCode::InvalidMeta => "E_INVALID_META",
            UsageCode::InvalidModelDefinition => "E_INVALID_MODEL_DEFINITION",
            UsageCode::InvalidAttribute => "E_INVALID_ATTRIBUTE",
            UsageCode::InvalidIndex => "E_INVALID_INDEX",
            UsageCode::InvalidEdgeDefinition => "E_INVALID_EDGE_DEFINITION",
            UsageCode::InvalidTenantType => "E_INVALID_TENANT_TYPE",
        }
    }
}

impl fmt::Display for UsageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translated classification of an adapter failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// A uniqueness constraint was violated on the listed attributes
    NotUnique { attributes: Vec<String> },
    /// Any other adapter failure
    Catchall,
}

impl AdapterErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            AdapterErrorKind::NotUnique { .. } => "E_UNIQUE",
            AdapterErrorKind::Catchall => "E_ADAPTER",
        }
    }
}

/// Error type for every ORM operation
#[derive(Debug, Error)]
pub enum OrmError {
    #[error("{code}: {message}")]
    Usage {
        code: UsageCode,
        message: String,
        details: Option<String>,
        context: Option<QueryContext>,
    },

    #[error(
        "{} from adapter `{}` during {}: {}",
        .kind.code(),
        .adapter,
        .context,
        .message
    )]
    Adapter {
        kind: AdapterErrorKind,
        adapter: String,
        message: String,
        context: QueryContext,
        #[source]
        source: AdapterError,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Lifecycle callback `{hook}` failed: {source}")]
    Lifecycle {
        hook: HookKind,
        #[source]
        source: HookError,
        context: Option<QueryContext>,
    },
}

impl OrmError {
    /// Create a usage error
    pub fn usage(code: UsageCode, message: impl Into<String>) -> Self {
        Self::Usage {
            code,
            message: message.into(),
            details: None,
            context: None,
        }
    }

    /// Create a usage error with additional details
    pub fn usage_with_details(
        code: UsageCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Usage {
            code,
            message: message.into(),
            details: Some(details.into()),
            context: None,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Attach call-site context, keeping any context already present
    pub fn with_context(self, context: &QueryContext) -> Self {
        match self {
            Self::Usage {
                code,
                message,
                details,
                context: None,
            } => Self::Usage {
                code,
                message,
                details,
                context: Some(context.clone()),
            },
            Self::Lifecycle {
                hook,
                source,
                context: None,
            } => Self::Lifecycle {
                hook,
                source,
                context: Some(context.clone()),
            },
            other => other,
        }
    }

    /// Usage code, if this is a usage error
    pub fn usage_code(&self) -> Option<UsageCode> {
        match self {
            Self::Usage { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Call-site context, if one was attached
    pub fn context(&self) -> Option<&QueryContext> {
        match self {
            Self::Usage { context, .. } | Self::Lifecycle { context, .. } => context.as_ref(),
            Self::Adapter { context, .. } => Some(context),
            Self::Configuration { .. } => None,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }

    pub fn is_adapter(&self) -> bool {
        matches!(self, Self::Adapter { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle { .. })
    }
}

impl From<ConfigError> for OrmError {
    fn from(error: ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}
