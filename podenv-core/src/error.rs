use std::path::PathBuf;

use thiserror::Error;

/// Possible errors when loading [`MutationRules`](crate::MutationRules)
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read a rules file
    #[error("failed to read rules file {path:?}: {source}")]
    ReadRules {
        /// Path of the rules file
        path: PathBuf,
        /// The underlying io error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse rules from YAML
    #[error("failed to parse rules: {0}")]
    ParseRules(#[source] serde_yaml::Error),

    /// A rule that can never be matched or applied
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}
