//! Configuration for containers and cancellation guards.
//!
//! Behaviors that differ between deployments (async fan-out availability,
//! duplicate async registration handling, interrupt termination policy) are
//! explicit settings rather than fixed defaults baked into the code.

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::diagnostics::{default_diagnostics, Diagnostics};

/// What to do when the same synchronous handler is registered twice on the
/// async path of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum DuplicateAsyncPolicy {
    /// Keep the first registration and log a warning.
    Ignore,
    /// Return [`EventError::DuplicateAsyncHandler`](crate::EventError::DuplicateAsyncHandler).
    #[default]
    Reject,
}

/// Whether an external interrupt lets the process terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum InterruptPolicy {
    /// Allow default termination after cancelling.
    #[default]
    Terminate,
    /// Suppress termination; the process continues after cancelling.
    Continue,
}

impl InterruptPolicy {
    pub fn continue_exec(self) -> bool {
        matches!(self, InterruptPolicy::Continue)
    }

    pub fn from_continue_exec(continue_exec: bool) -> Self {
        if continue_exec {
            InterruptPolicy::Continue
        } else {
            InterruptPolicy::Terminate
        }
    }
}

/// Serializable settings for an [`EventContainer`](crate::EventContainer).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct DispatchSettings {
    /// Enables the fire-and-forget async path.
    pub async_dispatch: bool,
    pub duplicate_async: DuplicateAsyncPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            async_dispatch: cfg!(feature = "async"),
            duplicate_async: DuplicateAsyncPolicy::default(),
        }
    }
}

#[cfg(feature = "config")]
impl DispatchSettings {
    /// Parses settings from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Configuration for an [`EventContainer`](crate::EventContainer).
///
/// # Examples
///
/// ```
/// use ferrous_events::{EventConfig, DuplicateAsyncPolicy, EventContainer};
///
/// let config = EventConfig::new()
///     .with_duplicate_async(DuplicateAsyncPolicy::Ignore)
///     .with_async_dispatch(false);
///
/// let container = EventContainer::<String>::with_config(config);
/// assert!(container.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct EventConfig {
    pub settings: DispatchSettings,
    pub diagnostics: Diagnostics,
    #[cfg(feature = "async")]
    pub runtime: Option<tokio::runtime::Handle>,
}

impl EventConfig {
    /// Default settings with the process-wide default diagnostics.
    pub fn new() -> Self {
        Self {
            settings: DispatchSettings::default(),
            diagnostics: default_diagnostics(),
            #[cfg(feature = "async")]
            runtime: None,
        }
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_async_dispatch(mut self, enabled: bool) -> Self {
        self.settings.async_dispatch = enabled;
        self
    }

    pub fn with_duplicate_async(mut self, policy: DuplicateAsyncPolicy) -> Self {
        self.settings.duplicate_async = policy;
        self
    }

    /// Runtime used for async fan-out. Without one, the runtime of the
    /// invoking thread is used if there is one.
    #[cfg(feature = "async")]
    pub fn with_runtime(mut self, runtime: tokio::runtime::Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a [`CancellationGuard`](crate::CancellationGuard).
#[derive(Clone, Debug)]
pub struct CancellationConfig {
    pub interrupt_policy: InterruptPolicy,
    /// Configuration for the guard's cancellation event.
    pub event: EventConfig,
}

impl CancellationConfig {
    pub fn new() -> Self {
        Self {
            interrupt_policy: InterruptPolicy::default(),
            event: EventConfig::new(),
        }
    }

    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = policy;
        self
    }

    pub fn with_event_config(mut self, event: EventConfig) -> Self {
        self.event = event;
        self
    }
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self::new()
    }
}
