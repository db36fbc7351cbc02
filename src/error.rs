//! Error taxonomy (spec.md §7).
//!
//! `ConfigurationError` and `SinkIoError` are ordinary, recoverable
//! `Result` errors. `MisuseError` and `AllocationError` describe conditions
//! spec.md marks fatal ("aborts with a diagnostic"); callers that hit one
//! are expected to log it via `tracing::error!` and panic, which is what
//! [`MisuseError::fatal`] and [`AllocationError::fatal`] do.

use thiserror::Error;

/// Raised synchronously at construction time for bad input: an invalid
/// timestamp pattern, a duplicate filter name, an invalid rotation window,
/// or a non-power-of-two allocator minimum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
  #[error("timestamp format specifiers %Qms, %Qus and %Qns are mutually exclusive")]
  MultipleFractionalSpecifiers,

  #[error("%X is locale-dependent and not representable by the timestamp cache")]
  UnsupportedLocaleSpecifier,

  #[error("filter with name '{0}' already exists on this handler")]
  DuplicateFilterName(String),

  #[error("invalid rotation window '{0}', expected 'M', 'H' or 'daily'")]
  InvalidRotationWindow(String),

  #[error("allocator minimum allocation {0} is not a power of two")]
  NonPowerOfTwoMinimum(usize),

  #[error("logger name '{0}' is {1} bytes, longer than the cache-line-sized bound of {bound}", bound = crate::logger::MAX_LOGGER_NAME_LEN)]
  LoggerNameTooLong(String, usize),

  #[error("unknown pattern placeholder '%({0})'")]
  UnknownPlaceholder(String),

  #[error("placeholder '%({0})' appears more than once in the pattern")]
  DuplicatePlaceholder(String),
}

/// Backend-fatal programmer errors: backtrace `store` before `set_capacity`,
/// or deallocation of an unknown pointer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MisuseError {
  #[error("logger '{0}' must call set_capacity(...) before store(...) (LOG_BACKTRACE used before init_backtrace)")]
  BacktraceStoreBeforeCapacity(String),

  #[error("deallocate() called with a pointer this allocator never handed out")]
  UnknownPointerDeallocated,
}

impl MisuseError {
  /// Logs via `tracing::error!` and aborts, matching spec.md's "Aborts with
  /// a diagnostic."
  #[track_caller]
  pub fn fatal(self) -> ! {
    tracing::error!(error = %self, "fatal misuse");
    panic!("quill: fatal misuse: {self}");
  }
}

/// A handler write or flush failed. Recovered: the backend logs a
/// diagnostic and continues with the next event.
#[derive(Debug, Error)]
pub enum SinkIoError {
  #[error("handler '{handler}' failed to write: {source}")]
  Write {
    handler: String,
    #[source]
    source: std::io::Error,
  },
  #[error("handler '{handler}' failed to flush: {source}")]
  Flush {
    handler: String,
    #[source]
    source: std::io::Error,
  },
}

/// OS allocation failure inside the free-list allocator. Fatal.
#[derive(Debug, Error)]
pub enum AllocationError {
  #[error("OS allocation of {requested} bytes failed: {source}")]
  OsAllocationFailed {
    requested: usize,
    #[source]
    source: std::io::Error,
  },
}

impl AllocationError {
  #[track_caller]
  pub fn fatal(self) -> ! {
    tracing::error!(error = %self, "fatal allocation failure");
    panic!("quill: fatal allocation failure: {self}");
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;

  #[test]
  fn configuration_error_messages_are_descriptive() {
    let e = ConfigurationError::DuplicateFilterName("LogLevelFilter".into());
    assert!(e.to_string().contains("LogLevelFilter"));
  }

  #[test]
  fn misuse_error_names_the_logger() {
    let e = MisuseError::BacktraceStoreBeforeCapacity("L1".into());
    assert!(e.to_string().contains("L1"));
  }
}
