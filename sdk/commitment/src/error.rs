use thiserror::Error;

/// Errors raised while parsing or combining shielded values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("malformed hex '{0}'")]
    MalformedHex(String),

    #[error("hex '{input}' is wider than {max_digits} digits")]
    TooWide { input: String, max_digits: usize },

    #[error("value overflow")]
    Overflow,

    #[error("value underflow: {minuend} - {subtrahend}")]
    Underflow { minuend: u128, subtrahend: u128 },
}
