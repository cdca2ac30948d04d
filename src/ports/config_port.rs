//! Configuration access port trait.

use crate::domain::error::QuantError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    fn require_string(&self, section: &str, key: &str) -> Result<String, QuantError> {
        self.get_string(section, key)
            .ok_or_else(|| QuantError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Comma-separated list; empty when the key is absent.
    fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get_string(section, key)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
