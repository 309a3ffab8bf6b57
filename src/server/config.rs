//! Server configuration.

use crate::core::DEFAULT_PORT;

/// The whole externally visible configuration surface: a listening port and
/// a silent startup flag. There is deliberately nothing else.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on. Port 0 asks the OS for a free one.
    pub port: u16,

    /// Suppress the startup log line.
    pub silent: bool,
}

impl ServerConfig {
    /// Configuration listening on `port`, verbose.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            silent: false,
        }
    }

    /// Set the silent startup flag.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.silent);
    }

    #[test]
    fn test_with_silent() {
        let config = ServerConfig::new(0).with_silent(true);
        assert_eq!(config.port, 0);
        assert!(config.silent);
    }
}
