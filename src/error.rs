//! # Scanner Error Handling
//!
//! Hierarchical error type for the scanning pipeline. Every variant carries an
//! [`ErrorContext`] with timestamp, severity, recovery hints and free-form
//! metadata, and errors are classified through traits rather than by string
//! matching.
//!
//! ## Taxonomy
//!
//! - **Access**: `PermissionDenied` (terminal), `DeviceUnavailable` (retryable
//!   with another device), `Enumeration`
//! - **Capability**: `IlluminationUnsupported` is distinct from `Hardware` so
//!   callers can hide the control instead of reporting a failure
//! - **Lifecycle**: `StreamClosed`, `State`
//! - **Upload decode**: `NoCodeFound`, `UnreadableImage`
//! - **Classification**: `Lookup` (never surfaced to presentation; the
//!   classifier degrades it into an `Unknown` result)
//!
//! A frame in which no code was found is not an error at all; the scan loop
//! simply samples again.
//!
//! ## Usage
//!
//! ```rust
//! use code_scanner::error::{ScannerError, Retryable, classify};
//!
//! let error = ScannerError::device_unavailable("cam-2", "device busy");
//! assert!(error.is_retryable());
//! assert!(!classify::is_terminal(&error));
//!
//! let denied = ScannerError::permission_denied("cam-1");
//! assert!(classify::is_terminal(&denied));
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

/// How loudly an error should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Diagnostic only
    Debug,
    /// Expected outcome, e.g. no torch on this camera
    Info,
    /// Stale handle or similar caller mistake
    Warning,
    /// Operation failed; the surface keeps working
    Error,
    /// Needs the user to act (grant access, plug in a camera)
    Critical,
    /// Scanner cannot continue
    Fatal,
}

/// Where and when an error was raised, plus handling hints.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    /// Pipeline step that failed, e.g. `open` or `classify`
    pub operation: Option<String>,
    pub context: Option<String>,
    /// Text a presentation surface can show next to the error
    pub recovery_suggestion: Option<String>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    pub recoverable: bool,
    /// Free-form fields attached by the raising layer
    pub metadata: std::collections::HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            recoverable: false,
            metadata: std::collections::HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Every failure the scanning pipeline reports.
#[derive(Debug)]
pub enum ScannerError {
    /// A configuration value failed validation
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// The user or platform refused camera access
    PermissionDenied {
        device_id: String,
        context: ErrorContext,
    },
    /// The device exists but could not be opened
    DeviceUnavailable {
        device_id: String,
        reason: String,
        context: ErrorContext,
    },
    /// Device enumeration failed or the device-access API is missing
    Enumeration {
        reason: String,
        context: ErrorContext,
    },
    /// The device has no controllable light source
    IlluminationUnsupported {
        device_id: String,
        context: ErrorContext,
    },
    /// A supported hardware operation failed
    Hardware {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Operation attempted on a released stream handle
    StreamClosed {
        operation: String,
        stream_id: u64,
        context: ErrorContext,
    },
    /// Operation not allowed in the current session state
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// An uploaded image contained no readable code
    NoCodeFound { context: ErrorContext },
    /// An uploaded file could not be decoded as an image
    UnreadableImage {
        reason: String,
        context: ErrorContext,
    },
    /// The classification backing service could not resolve a key
    Lookup {
        key: String,
        reason: String,
        context: ErrorContext,
    },
    /// Filesystem access for replay frames, uploads or config
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// Error bubbled up from a dependency
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
}

impl ScannerError {
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a permission error. Terminal for the session.
    pub fn permission_denied(device_id: impl Into<String>) -> Self {
        Self::PermissionDenied {
            device_id: device_id.into(),
            context: ErrorContext::new(),
        }
        .with_severity(ErrorSeverity::Critical)
        .with_recovery_suggestion("Grant camera access to this application and start the scanner again")
    }

    /// Create a device-unavailable error. Retryable by choosing another device.
    pub fn device_unavailable(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            device_id: device_id.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
        .retryable()
        .recoverable()
        .with_recovery_suggestion("Select a different camera")
    }

    pub fn enumeration(reason: impl Into<String>) -> Self {
        Self::Enumeration {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Reported instead of silently ignoring a torch request.
    pub fn illumination_unsupported(device_id: impl Into<String>) -> Self {
        Self::IlluminationUnsupported {
            device_id: device_id.into(),
            context: ErrorContext::new(),
        }
        .with_severity(ErrorSeverity::Info)
    }

    pub fn hardware(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Hardware {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn stream_closed(operation: impl Into<String>, stream_id: u64) -> Self {
        Self::StreamClosed {
            operation: operation.into(),
            stream_id,
            context: ErrorContext::new(),
        }
        .with_severity(ErrorSeverity::Warning)
    }

    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Upload decoded fine but held no code.
    pub fn no_code_found() -> Self {
        Self::NoCodeFound {
            context: ErrorContext::new(),
        }
        .with_severity(ErrorSeverity::Info)
        .with_recovery_suggestion("Upload a sharper image with the whole code visible")
    }

    pub fn unreadable_image(reason: impl Into<String>) -> Self {
        Self::UnreadableImage {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn lookup(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lookup {
            key: key.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
        .retryable()
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Attach a path to an I/O error. No-op for other variants.
    pub fn with_path(mut self, new_path: impl Into<String>) -> Self {
        if let Self::Io { path, .. } = &mut self {
            *path = Some(new_path.into());
        }
        self
    }

    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    pub fn retryable(mut self) -> Self {
        self.context_mut().retryable = true;
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.context_mut().recoverable = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::PermissionDenied { context, .. } => context,
            Self::DeviceUnavailable { context, .. } => context,
            Self::Enumeration { context, .. } => context,
            Self::IlluminationUnsupported { context, .. } => context,
            Self::Hardware { context, .. } => context,
            Self::StreamClosed { context, .. } => context,
            Self::State { context, .. } => context,
            Self::NoCodeFound { context } => context,
            Self::UnreadableImage { context, .. } => context,
            Self::Lookup { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::PermissionDenied { context, .. } => context,
            Self::DeviceUnavailable { context, .. } => context,
            Self::Enumeration { context, .. } => context,
            Self::IlluminationUnsupported { context, .. } => context,
            Self::Hardware { context, .. } => context,
            Self::StreamClosed { context, .. } => context,
            Self::State { context, .. } => context,
            Self::NoCodeFound { context } => context,
            Self::UnreadableImage { context, .. } => context,
            Self::Lookup { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Stable snake_case name, used in logs and by presentation surfaces.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::DeviceUnavailable { .. } => "device_unavailable",
            Self::Enumeration { .. } => "enumeration",
            Self::IlluminationUnsupported { .. } => "illumination_unsupported",
            Self::Hardware { .. } => "hardware",
            Self::StreamClosed { .. } => "stream_closed",
            Self::State { .. } => "state",
            Self::NoCodeFound { .. } => "no_code_found",
            Self::UnreadableImage { .. } => "unreadable_image",
            Self::Lookup { .. } => "lookup",
            Self::Io { .. } => "io",
            Self::External { .. } => "external",
        }
    }
}

impl fmt::Display for ScannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerError::Config {
                field,
                value,
                reason,
                ..
            } => write!(f, "Invalid configuration value {field} = '{value}': {reason}"),
            ScannerError::PermissionDenied { device_id, .. } => {
                write!(f, "Camera access denied for device '{}'", device_id)
            }
            ScannerError::DeviceUnavailable {
                device_id, reason, ..
            } => {
                write!(f, "Camera '{}' is unavailable: {}", device_id, reason)
            }
            ScannerError::Enumeration { reason, .. } => {
                write!(f, "Failed to enumerate capture devices: {}", reason)
            }
            ScannerError::IlluminationUnsupported { device_id, .. } => {
                write!(f, "Camera '{}' has no controllable torch", device_id)
            }
            ScannerError::Hardware {
                operation, reason, ..
            } => {
                write!(f, "Hardware failure during {}: {}", operation, reason)
            }
            ScannerError::StreamClosed {
                operation,
                stream_id,
                ..
            } => {
                write!(
                    f,
                    "Cannot {} on stream #{}: stream has been released",
                    operation, stream_id
                )
            }
            ScannerError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Cannot {} while the session is {}: {}",
                    attempted_operation, current_state, reason
                )
            }
            ScannerError::NoCodeFound { .. } => {
                write!(f, "No machine-readable code found in image")
            }
            ScannerError::UnreadableImage { reason, .. } => {
                write!(f, "Unreadable image: {}", reason)
            }
            ScannerError::Lookup { key, reason, .. } => {
                write!(f, "Lookup for '{}' failed: {}", key, reason)
            }
            ScannerError::Io {
                operation,
                path,
                source,
                ..
            } => {
                match path {
                    Some(path) => write!(f, "Failed to {operation} '{path}': {source}"),
                    None => write!(f, "Failed to {operation}: {source}"),
                }
            }
            ScannerError::External { library, source, .. } => write!(f, "{library}: {source}"),
        }
    }
}

impl StdError for ScannerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type ScannerResult<T> = Result<T, ScannerError>;

/// Whether trying the same operation again can succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Suggested wait before retrying.
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }
}

impl Retryable for ScannerError {
    fn is_retryable(&self) -> bool {
        if matches!(self, Self::PermissionDenied { .. }) {
            return false;
        }
        self.context().retryable
            || matches!(
                self,
                Self::DeviceUnavailable { .. }
                    | Self::Hardware { .. }
                    | Self::Lookup { .. }
                    | Self::Io { .. }
            )
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Hardware { .. } => Some(250),
            Self::Lookup { .. } => Some(1000),
            Self::Io { .. } => Some(100),
            _ => None,
        }
    }
}

/// Whether the scanner can keep going by doing something else.
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;

    fn recovery_strategies(&self) -> Vec<RecoveryStrategy>;
}

/// What a caller can do instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    Retry { max_attempts: usize, delay_ms: u64 },
    /// Use an alternative, such as another camera
    Fallback { description: String },
    /// Tear down and rebuild the named component
    Reinitialize { component: String },
    /// Keep running with reduced functionality
    Degrade { description: String },
}

impl Recoverable for ScannerError {
    fn is_recoverable(&self) -> bool {
        self.context().recoverable
            || matches!(
                self,
                Self::DeviceUnavailable { .. }
                    | Self::IlluminationUnsupported { .. }
                    | Self::StreamClosed { .. }
                    | Self::Lookup { .. }
            )
    }

    fn recovery_strategies(&self) -> Vec<RecoveryStrategy> {
        match self {
            Self::DeviceUnavailable { .. } => vec![RecoveryStrategy::Fallback {
                description: "Open another capture device".to_string(),
            }],
            Self::IlluminationUnsupported { .. } => vec![RecoveryStrategy::Degrade {
                description: "Hide the torch control".to_string(),
            }],
            Self::StreamClosed { .. } => vec![RecoveryStrategy::Reinitialize {
                component: "capture_session".to_string(),
            }],
            Self::Hardware { .. } => vec![RecoveryStrategy::Retry {
                max_attempts: 2,
                delay_ms: 250,
            }],
            Self::Lookup { .. } => vec![
                RecoveryStrategy::Retry {
                    max_attempts: 3,
                    delay_ms: 1000,
                },
                RecoveryStrategy::Degrade {
                    description: "Present the raw payload as an unknown result".to_string(),
                },
            ],
            _ => vec![],
        }
    }
}

pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for ScannerError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

pub trait HasRecoverySuggestion {
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for ScannerError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Predicates used by the session and the CLI to decide how to react.
pub mod classify {
    use super::*;

    /// Errors after which the session must not retry on its own
    pub fn is_terminal(error: &ScannerError) -> bool {
        matches!(
            error,
            ScannerError::PermissionDenied { .. } | ScannerError::Config { .. }
        ) || error.severity() == ErrorSeverity::Fatal
    }

    /// Errors that can clear up without any change on the caller's side
    pub fn is_transient(error: &ScannerError) -> bool {
        matches!(
            error,
            ScannerError::Hardware { .. } | ScannerError::Lookup { .. } | ScannerError::Io { .. }
        )
    }

    pub fn requires_user_intervention(error: &ScannerError) -> bool {
        error.severity() >= ErrorSeverity::Critical
    }
}

impl From<std::io::Error> for ScannerError {
    fn from(error: std::io::Error) -> Self {
        Self::io("access file", error)
    }
}

impl From<serde_json::Error> for ScannerError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<toml::de::Error> for ScannerError {
    fn from(error: toml::de::Error) -> Self {
        Self::config("config_file", "<toml>", error.to_string())
    }
}

impl From<tokio::task::JoinError> for ScannerError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::external("tokio", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_terminal() {
        let error = ScannerError::config("frame_interval_ms", "0", "must be greater than 0");
        assert_eq!(error.category(), "config");
        assert!(!error.is_retryable());
        assert!(classify::is_terminal(&error));
    }

    #[test]
    fn test_permission_denied_is_terminal() {
        let error = ScannerError::permission_denied("cam-1").retryable();
        assert_eq!(error.category(), "permission_denied");
        assert!(!error.is_retryable());
        assert!(classify::is_terminal(&error));
        assert!(classify::requires_user_intervention(&error));
        assert!(error.recovery_suggestion().is_some());
    }

    #[test]
    fn test_device_unavailable_is_retryable() {
        let error = ScannerError::device_unavailable("cam-2", "in use by another application");
        assert!(error.is_retryable());
        assert!(error.is_recoverable());
        assert_eq!(
            error.recovery_strategies(),
            vec![RecoveryStrategy::Fallback {
                description: "Open another capture device".to_string()
            }]
        );
    }

    #[test]
    fn test_unsupported_distinct_from_hardware() {
        let unsupported = ScannerError::illumination_unsupported("cam-1");
        let failure = ScannerError::hardware("set_illumination", "constraint rejected");
        assert_ne!(unsupported.category(), failure.category());
        assert!(!unsupported.is_retryable());
        assert!(failure.is_retryable());
        assert_eq!(failure.retry_delay_ms(), Some(250));
    }

    #[test]
    fn test_lookup_error_carries_context() {
        let error = ScannerError::lookup("WH-BT100", "catalog offline")
            .with_operation("classify")
            .with_context("resolving product record")
            .with_metadata("prefix", "product");

        assert!(error.is_retryable());
        assert!(classify::is_transient(&error));
        assert_eq!(error.context().operation.as_deref(), Some("classify"));
        assert_eq!(
            error.context().metadata.get("prefix").map(String::as_str),
            Some("product")
        );
    }

    #[test]
    fn test_io_path_in_display() {
        let error = ScannerError::io(
            "read frame directory",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        )
        .with_path("/tmp/frames");
        assert!(error.to_string().contains("/tmp/frames"));
        assert!(error.source().is_some());
    }
}
