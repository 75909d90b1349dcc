use crate::domain::payload::MerchantProfile;
use crate::domain::plan::PlanCatalog;
use crate::error::{CheckoutError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest accepted purchase window, one year.
pub const MAX_PURCHASE_WINDOW_HOURS: i64 = 24 * 365;
/// Longest accepted renewal period, ten years.
pub const MAX_RENEWAL_DAYS: i64 = 3650;

/// Runtime settings for the checkout core. Every field has a default, so an
/// empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    pub merchant: MerchantProfile,
    pub txid_prefix: String,
    pub include_initiation_method: bool,
    pub purchase_window_hours: i64,
    pub renewal_days: i64,
    pub oracle_timeout_ms: u64,
    pub storage_timeout_ms: u64,
    pub plans: PlanCatalog,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            merchant: MerchantProfile::default(),
            txid_prefix: "AL".to_string(),
            include_initiation_method: true,
            purchase_window_hours: 24,
            renewal_days: 30,
            oracle_timeout_ms: 5_000,
            storage_timeout_ms: 2_000,
            plans: PlanCatalog::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|e| {
            CheckoutError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.merchant.validate()?;
        if !self.txid_prefix.is_ascii() || self.txid_prefix.len() > 10 {
            return Err(CheckoutError::Config(format!(
                "txid_prefix must be at most 10 ASCII characters, got {:?}",
                self.txid_prefix
            )));
        }
        if !(1..=MAX_PURCHASE_WINDOW_HOURS).contains(&self.purchase_window_hours) {
            return Err(CheckoutError::Config(format!(
                "purchase_window_hours must be between 1 and {MAX_PURCHASE_WINDOW_HOURS}, got {}",
                self.purchase_window_hours
            )));
        }
        if !(1..=MAX_RENEWAL_DAYS).contains(&self.renewal_days) {
            return Err(CheckoutError::Config(format!(
                "renewal_days must be between 1 and {MAX_RENEWAL_DAYS}, got {}",
                self.renewal_days
            )));
        }
        if self.oracle_timeout_ms == 0 || self.storage_timeout_ms == 0 {
            return Err(CheckoutError::Config(
                "timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamped to the accepted range, so an unvalidated value cannot overflow.
    pub fn purchase_window(&self) -> Duration {
        Duration::hours(self.purchase_window_hours.clamp(1, MAX_PURCHASE_WINDOW_HOURS))
    }

    pub fn renewal_period(&self) -> Duration {
        Duration::days(self.renewal_days.clamp(1, MAX_RENEWAL_DAYS))
    }

    pub fn oracle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn storage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.storage_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CheckoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.purchase_window(), Duration::hours(24));
        assert_eq!(config.renewal_period(), Duration::days(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"merchant": {{"name": "Loja Sao Joao", "city": "Goiânia", "key": "k@x.com"}}, "renewal_days": 7}}"#).unwrap();

        let config = CheckoutConfig::load(file.path()).unwrap();
        assert_eq!(config.merchant.city, "Goiânia");
        assert_eq!(config.merchant.category_code, "0000");
        assert_eq!(config.renewal_days, 7);
        assert_eq!(config.purchase_window_hours, 24);
        assert_eq!(config.plans.plans().len(), 3);
    }

    #[test]
    fn test_invalid_merchant_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"merchant": {{"name": "x", "city": "A City Name Far Too Long", "key": "k"}}}}"#).unwrap();
        assert!(matches!(
            CheckoutConfig::load(file.path()),
            Err(CheckoutError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            CheckoutConfig::load(file.path()),
            Err(CheckoutError::Config(_))
        ));
    }

    #[test]
    fn test_out_of_range_periods_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"purchase_window_hours": 9223372036854775807}}"#).unwrap();
        assert!(matches!(
            CheckoutConfig::load(file.path()),
            Err(CheckoutError::Config(_))
        ));

        let config = CheckoutConfig {
            renewal_days: i64::MAX,
            purchase_window_hours: i64::MIN,
            ..CheckoutConfig::default()
        };
        assert!(matches!(config.validate(), Err(CheckoutError::Config(_))));
        assert_eq!(config.renewal_period(), Duration::days(MAX_RENEWAL_DAYS));
        assert_eq!(config.purchase_window(), Duration::hours(1));
    }
}
