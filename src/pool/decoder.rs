// src/pool/decoder.rs

use std::fmt::Display;

/// Turns one raw input line into an output row.
///
/// Implemented by the record codec and, through the blanket impl below, by any
/// closure with a matching signature.
pub trait LineDecoder: Send + Sync {
    type Output: Send + 'static;
    type Error: Display + Send;

    fn decode(&self, line: &str) -> Result<Self::Output, Self::Error>;
}

impl<F, O, E> LineDecoder for F
where
    F: Fn(&str) -> Result<O, E> + Send + Sync,
    O: Send + 'static,
    E: Display + Send,
{
    type Output = O;
    type Error = E;

    fn decode(&self, line: &str) -> Result<O, E> {
        self(line)
    }
}
