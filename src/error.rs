// Library-wide error type for ReconNet.
// Typed errors propagate through the store, collectors and engines; `anyhow`
// is used only at the CLI boundary (see `main.rs`/`cli.rs`).

use thiserror::Error;

/// Error kinds recognized at component boundaries.
#[derive(Error, Debug)]
pub enum ReconError {
    /// An upsert candidate carried neither a MAC nor an IP address.
    #[error("upsert candidate has neither a MAC address nor an IP address")]
    IdentityUnresolved,

    /// The on-disk schema was written by a newer process version.
    #[error("database schema version {stored} is newer than running version {running}")]
    NewerSchema { stored: String, running: String },

    /// A platform-conditional collector is not available on this host.
    #[error("collector '{0}' is not available on this platform")]
    CollectorUnavailable(&'static str),

    /// A collector probe timed out; callers recover at host granularity.
    #[error("collector '{collector}' timed out against {target}")]
    CollectorTimeout { collector: &'static str, target: String },

    /// A collector received a malformed or unexpected response.
    #[error("collector '{collector}' protocol error against {target}: {detail}")]
    CollectorProtocol {
        collector: &'static str,
        target: String,
        detail: String,
    },

    /// A store write failed; the enclosing transaction has been rolled back.
    #[error("store write failed: {0}")]
    StoreWrite(String),

    /// A store read failed.
    #[error("store query failed: {0}")]
    StoreQuery(String),

    /// A migration failed to apply; its tracking row was not inserted.
    #[error("migration {namespace}/{version} failed: {detail}")]
    MigrationFailed {
        namespace: String,
        version: i64,
        detail: String,
    },

    /// The enclosing operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A required credential field was missing from the vault's decrypted map.
    #[error("credential '{credential_id}' is missing required field '{field}'")]
    MissingCredentialField {
        credential_id: String,
        field: &'static str,
    },

    /// A subnet or CIDR string failed to parse.
    #[error("invalid subnet '{0}'")]
    InvalidSubnet(String),
}

pub type Result<T> = std::result::Result<T, ReconError>;

impl From<sqlx::Error> for ReconError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => ReconError::StoreQuery("row not found".to_string()),
            _ => ReconError::StoreQuery(e.to_string()),
        }
    }
}

/// Extension trait for attaching operation context to a store error,
/// mirroring the teacher crate's `ErrorContext` pattern.
pub trait StoreErrorContext<T> {
    fn write_context(self, op: &str) -> Result<T>;
    fn query_context(self, op: &str) -> Result<T>;
}

impl<T> StoreErrorContext<T> for std::result::Result<T, sqlx::Error> {
    fn write_context(self, op: &str) -> Result<T> {
        self.map_err(|e| ReconError::StoreWrite(format!("{op}: {e}")))
    }

    fn query_context(self, op: &str) -> Result<T> {
        self.map_err(|e| ReconError::StoreQuery(format!("{op}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_schema_display() {
        let err = ReconError::NewerSchema {
            stored: "0.5.0".to_string(),
            running: "0.4.0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.5.0"));
        assert!(msg.contains("0.4.0"));
    }

    #[test]
    fn test_write_context() {
        let result: std::result::Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let wrapped = result.write_context("upsert_device");
        assert!(wrapped.is_err());
        assert!(wrapped.unwrap_err().to_string().contains("upsert_device"));
    }
}
