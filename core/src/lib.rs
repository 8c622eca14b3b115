//! Core functionality for overseer
//!
//! This crate contains the process supervisor and everything it depends on:
//! identifier generation, the platform process binding, captured-output
//! storage, settings and error types. Front-ends only need
//! [`supervisor::ProcessSupervisor`] and the types it hands out.

pub mod config;
pub mod error;
pub mod id;
pub mod output;
pub mod process;
pub mod supervisor;


// Re-export schema types for convenience
pub use schema::{EventSeverity, OutputStream, ProcessEvent, ProcessSnapshot, ProcessStatus};

pub use config::SupervisorSettings;
pub use error::{CoreError, Result};
pub use supervisor::{ProcessCallbacks, ProcessRecord, ProcessSupervisor, SupervisorConfig};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
