use thiserror::Error;

/// Failures of [`Registry`][crate::Registry] lookups.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The name is already registered for an instance with different type parameters.
    #[error("{kind} `{name}` is already registered with a type other than `{requested}`")]
    TypeMismatch {
        /// Which map the lookup went to ("event" or "query").
        kind: &'static str,

        /// The name that was looked up.
        name: String,

        /// The type the caller asked for.
        requested: &'static str,
    },
}
