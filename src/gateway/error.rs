use thiserror::Error;

/// Failures raised while resolving a function's `custom.lambdefy` options.
///
/// Resolution stops at the first violation; the message is meant to be shown
/// to the user verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// A supplied value breaks its type, range or vocabulary constraint.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Every value is individually valid but the combination is unsatisfiable.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OptionError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        OptionError::InvalidOption(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        OptionError::Configuration(msg.into())
    }
}
