//! Engine configuration

use crate::dialect::{Dialect, Holder};
use crate::params::Addressing;

/// Driver used when none is configured
pub const DEFAULT_DRIVER: &str = "mysql";

/// Registry-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Driver name; selects bind markers and template quoting rules
    pub driver: String,
    pub addressing: Addressing,
    /// Memoize compiled metadata
    pub cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            addressing: Addressing::Named,
            cache: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = addressing;
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::from_driver(&self.driver)
    }

    pub fn holder(&self) -> Holder {
        self.dialect().holder()
    }
}
