//! Error types for the payg engine.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("invalid channel id: {0}")] InvalidId(String),
    #[error("invalid amount: {0}")] InvalidAmount(String),
    #[error("invalid address: {0}")] InvalidAddress(String),
    #[error("unknown channel status: {0}")] UnknownStatus(String),
    #[error("settlement underflow: total {total} < remain {remain}")] SettlementUnderflow { total: String, remain: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain transport: {0}")] Transport(String),
    #[error("chain rpc error {code}: {message}")] Rpc { code: i64, message: String },
    #[error("malformed chain response: {0}")] Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("index transport: {0}")] Transport(String),
    #[error("index query failed: {0}")] Query(String),
    #[error("malformed index response: {0}")] Malformed(String),
}

#[derive(Error, Debug)]
pub enum PaygError {
    #[error(transparent)] Channel(#[from] ChannelError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Index(#[from] IndexError),
    #[error("storage: {0}")] Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_error_converts_transparently() {
        let err: PaygError = ChannelError::InvalidId("0xzz".into()).into();
        assert_eq!(err.to_string(), "invalid channel id: 0xzz");
    }

    #[test]
    fn settlement_underflow_message() {
        let err = ChannelError::SettlementUnderflow {
            total: "10".into(),
            remain: "11".into(),
        };
        assert!(err.to_string().contains("total 10 < remain 11"));
    }

    #[test]
    fn storage_error_message() {
        let err = PaygError::Storage("missing column family: channels".into());
        assert_eq!(err.to_string(), "storage: missing column family: channels");
    }
}
