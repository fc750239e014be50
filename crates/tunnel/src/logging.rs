//! Tracing subscriber setup for binaries embedding the server.

use tracing_subscriber::EnvFilter;

use crate::TunnelError;

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g.
/// `"tunnel=info"`) is used.
///
/// # Errors
/// [`TunnelError::Logging`] if the directive doesn't parse or a global
/// subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), TunnelError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| TunnelError::Logging(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| TunnelError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_second_install_is_an_error() {
        let _ = init_tracing("tunnel=debug");

        let again = init_tracing("tunnel=debug");

        assert!(matches!(again, Err(TunnelError::Logging(_))));
    }
}
