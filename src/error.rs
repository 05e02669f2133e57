use thiserror::Error;

/// Errors returned by both protocol engines and the codecs
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid SDI-12 address")]
    InvalidAddress,
    #[error("invalid or unsupported command")]
    InvalidCommand,
    #[error("buffer capacity exceeded")]
    BufferOverflow,
    /// The command was meant for another sensor. Nothing was transmitted; callers should not
    /// treat this as a failure.
    #[error("command addressed to another sensor")]
    NotAddressed,
    #[error("no measurement data available")]
    NoData,
    #[error("parameter registry is full")]
    ParamLimitReached,
    /// Kept for parity with the protocol error taxonomy. The collaborator traits make the
    /// required capabilities mandatory at compile time, so the engines never return it.
    #[error("required collaborator missing")]
    MissingCallback,
    #[error("no response within timeout")]
    Timeout,
    #[error("CRC mismatch")]
    CrcMismatch,
    #[error("malformed response")]
    ParseFailed,
    #[error("operation aborted")]
    Aborted,
}

impl Error {
    /// Outcomes for which a sensor stays silent on the bus
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::NotAddressed | Error::InvalidCommand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_errors() {
        assert!(Error::NotAddressed.is_silent());
        assert!(Error::InvalidCommand.is_silent());
        assert!(!Error::Timeout.is_silent());
        assert!(!Error::CrcMismatch.is_silent());
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::CrcMismatch.to_string(), "CRC mismatch");
        assert_eq!(Error::Timeout.to_string(), "no response within timeout");
    }
}
