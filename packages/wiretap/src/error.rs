use thiserror::Error;

/// Errors surfaced while assembling an instrumented instance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A name that participates in metric naming or enablement lookup was blank.
    #[error("{what} cannot be blank")]
    BlankName {
        /// Which name was blank (e.g. "instance name").
        what: &'static str,
    },

    /// Resolving the handler's metrics in the registry failed.
    #[error(transparent)]
    Metrics(#[from] meterbox::Error),
}

/// A specialized `Result` type returning [`ConfigError`] as the error value.
pub type Result<T> = std::result::Result<T, ConfigError>;
