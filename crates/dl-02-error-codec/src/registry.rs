//! Error name lookup.
//!
//! Firmware builds register different error tables, so the registry is a
//! merge of providers. Providers added later override earlier ones.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ErrorCode;

/// Source of symbolic names for numeric error codes.
pub trait ErrorNameProvider: Send + Sync {
    /// All `(code, name)` pairs this provider knows.
    fn names(&self) -> Vec<(i64, String)>;
}

/// Provider backed by a static table.
#[derive(Debug, Clone, Copy)]
pub struct StaticErrorNames(pub &'static [(i64, &'static str)]);

impl ErrorNameProvider for StaticErrorNames {
    fn names(&self) -> Vec<(i64, String)> {
        self.0.iter().map(|(c, n)| (*c, (*n).to_string())).collect()
    }
}

/// Common ESP-IDF error codes (`esp_err.h` and `esp_wifi.h`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EspIdfErrors;

const ESP_IDF_ERRORS: &[(i64, &str)] = &[
    (-1, "ESP_FAIL"),
    (0x101, "ESP_ERR_NO_MEM"),
    (0x102, "ESP_ERR_INVALID_ARG"),
    (0x103, "ESP_ERR_INVALID_STATE"),
    (0x104, "ESP_ERR_INVALID_SIZE"),
    (0x105, "ESP_ERR_NOT_FOUND"),
    (0x106, "ESP_ERR_NOT_SUPPORTED"),
    (0x107, "ESP_ERR_TIMEOUT"),
    (0x108, "ESP_ERR_INVALID_RESPONSE"),
    (0x109, "ESP_ERR_INVALID_CRC"),
    (0x10A, "ESP_ERR_INVALID_VERSION"),
    (0x10B, "ESP_ERR_INVALID_MAC"),
    (0x10C, "ESP_ERR_NOT_FINISHED"),
    (0x10D, "ESP_ERR_NOT_ALLOWED"),
    (0x3001, "ESP_ERR_WIFI_NOT_INIT"),
    (0x3002, "ESP_ERR_WIFI_NOT_STARTED"),
    (0x3003, "ESP_ERR_WIFI_NOT_STOPPED"),
    (0x3004, "ESP_ERR_WIFI_IF"),
    (0x3005, "ESP_ERR_WIFI_MODE"),
    (0x3006, "ESP_ERR_WIFI_STATE"),
    (0x3007, "ESP_ERR_WIFI_CONN"),
    (0x3008, "ESP_ERR_WIFI_NVS"),
    (0x3009, "ESP_ERR_WIFI_MAC"),
    (0x300A, "ESP_ERR_WIFI_SSID"),
    (0x300B, "ESP_ERR_WIFI_PASSWORD"),
    (0x300C, "ESP_ERR_WIFI_TIMEOUT"),
    (0x300D, "ESP_ERR_WIFI_WAKE_FAIL"),
];

impl ErrorNameProvider for EspIdfErrors {
    fn names(&self) -> Vec<(i64, String)> {
        StaticErrorNames(ESP_IDF_ERRORS).names()
    }
}

/// Merged code-to-name table.
#[derive(Clone, Default)]
pub struct ErrorRegistry {
    names: HashMap<i64, String>,
}

impl std::fmt::Debug for ErrorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRegistry")
            .field("known_codes", &self.names.len())
            .finish()
    }
}

impl ErrorRegistry {
    /// Empty registry; every numeric code gets a hex label.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with [`EspIdfErrors`].
    pub fn esp_idf() -> Self {
        Self::new().with_provider(&EspIdfErrors)
    }

    /// Builder form of [`ErrorRegistry::register`].
    pub fn with_provider(mut self, provider: &dyn ErrorNameProvider) -> Self {
        self.register(provider);
        self
    }

    /// Merge a provider's names, overriding existing entries.
    pub fn register(&mut self, provider: &dyn ErrorNameProvider) {
        for (code, name) in provider.names() {
            self.names.insert(code, name);
        }
    }

    /// Registered name for `code`.
    pub fn lookup(&self, code: i64) -> Option<&str> {
        self.names.get(&code).map(String::as_str)
    }

    /// Symbolic name for a wire code. Textual codes are already names.
    pub fn resolve(&self, code: &ErrorCode) -> String {
        match code {
            ErrorCode::Name(name) => name.clone(),
            ErrorCode::Number(n) => self
                .lookup(*n)
                .map(str::to_string)
                .unwrap_or_else(|| fallback_name(*n)),
        }
    }

    /// Number of known codes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// `ESP_ERR_0x%04x` label for codes no provider knows.
fn fallback_name(code: i64) -> String {
    if code < 0 {
        format!("ESP_ERR_-0x{:04x}", code.unsigned_abs())
    } else {
        format!("ESP_ERR_0x{:04x}", code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_names() {
        let registry = ErrorRegistry::new();
        assert_eq!(registry.resolve(&ErrorCode::Number(1234)), "ESP_ERR_0x04d2");
        assert_eq!(registry.resolve(&ErrorCode::Number(0x12345)), "ESP_ERR_0x12345");
        assert_eq!(registry.resolve(&ErrorCode::Number(-2)), "ESP_ERR_-0x0002");
        assert_eq!(registry.resolve(&ErrorCode::Name("E_PIN".into())), "E_PIN");
    }

    #[test]
    fn test_esp_idf_names() {
        let registry = ErrorRegistry::esp_idf();
        assert_eq!(registry.lookup(0x102), Some("ESP_ERR_INVALID_ARG"));
        assert_eq!(registry.resolve(&ErrorCode::Number(-1)), "ESP_FAIL");
        assert_eq!(registry.resolve(&ErrorCode::Number(0x3007)), "ESP_ERR_WIFI_CONN");
    }

    #[test]
    fn test_later_provider_overrides() {
        static CUSTOM: &[(i64, &str)] = &[(0x102, "BAD_ARGUMENT"), (0x9000, "SENSOR_OFFLINE")];

        let registry = ErrorRegistry::esp_idf().with_provider(&StaticErrorNames(CUSTOM));
        assert_eq!(registry.lookup(0x102), Some("BAD_ARGUMENT"));
        assert_eq!(registry.lookup(0x9000), Some("SENSOR_OFFLINE"));
        assert_eq!(registry.lookup(0x101), Some("ESP_ERR_NO_MEM"));
    }
}
