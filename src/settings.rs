//! Process-wide configurable values.
//!
//! Values live in the adapter's key/value settings store (last write wins).
//! Each operation reads them once into a [`Settings`] snapshot so that the
//! reward and conversion math stays deterministic for that operation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    reward::DEFAULT_PENALTY_PER_DAY,
};

pub const TOKENS_PER_DOLLAR: &str = "tokens_per_dollar";
pub const CASH_OUT_INTEREST_RATE: &str = "cash_out_interest_rate";
pub const PENALTY_PER_DAY: &str = "penalty_per_day";

/// Fallbacks used when the settings store has no (valid) value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingDefaults {
    pub tokens_per_dollar: f64,
    pub cash_out_interest_rate: f64,
    pub penalty_per_day: u64,
}

impl Default for SettingDefaults {
    fn default() -> Self {
        Self {
            tokens_per_dollar: 100.0,
            cash_out_interest_rate: 1.0,
            penalty_per_day: DEFAULT_PENALTY_PER_DAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub tokens_per_dollar: f64,
    pub cash_out_interest_rate: f64,
    pub penalty_per_day: u64,
}

impl Settings {
    /// Build a snapshot from stored raw values. Unparseable or out-of-range
    /// values fall back to the defaults rather than failing the operation.
    pub fn from_raw(raw: &HashMap<String, String>, defaults: &SettingDefaults) -> Self {
        let tokens_per_dollar = raw
            .get(TOKENS_PER_DOLLAR)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(defaults.tokens_per_dollar);

        let cash_out_interest_rate = raw
            .get(CASH_OUT_INTEREST_RATE)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(defaults.cash_out_interest_rate);

        let penalty_per_day = raw
            .get(PENALTY_PER_DAY)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(defaults.penalty_per_day);

        Self {
            tokens_per_dollar,
            cash_out_interest_rate,
            penalty_per_day,
        }
    }

    /// `(tokens / tokens_per_dollar) * interest_rate`, rounded to cents.
    pub fn tokens_to_dollars(&self, tokens: u64) -> f64 {
        if self.tokens_per_dollar <= 0.0 {
            return 0.0;
        }
        let dollars = (tokens as f64 / self.tokens_per_dollar) * self.cash_out_interest_rate;
        (dollars * 100.0).round() / 100.0
    }
}

impl From<SettingDefaults> for Settings {
    fn from(defaults: SettingDefaults) -> Self {
        Self {
            tokens_per_dollar: defaults.tokens_per_dollar,
            cash_out_interest_rate: defaults.cash_out_interest_rate,
            penalty_per_day: defaults.penalty_per_day,
        }
    }
}

/// Raw administrator input; every present field is validated before anything
/// is written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub tokens_per_dollar: Option<String>,
    pub cash_out_interest_rate: Option<String>,
    pub penalty_per_day: Option<String>,
}

impl SettingsUpdate {
    pub fn validate(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();

        if let Some(raw) = &self.tokens_per_dollar {
            let value = parse_rate(raw, TOKENS_PER_DOLLAR)?;
            if value <= 0.0 {
                return Err(Error::Validation(format!(
                    "{} must be greater than zero",
                    TOKENS_PER_DOLLAR
                )));
            }
            pairs.push((TOKENS_PER_DOLLAR.to_string(), raw.trim().to_string()));
        }

        if let Some(raw) = &self.cash_out_interest_rate {
            let value = parse_rate(raw, CASH_OUT_INTEREST_RATE)?;
            if value < 0.0 {
                return Err(Error::Validation(format!(
                    "{} cannot be negative",
                    CASH_OUT_INTEREST_RATE
                )));
            }
            pairs.push((CASH_OUT_INTEREST_RATE.to_string(), raw.trim().to_string()));
        }

        if let Some(raw) = &self.penalty_per_day {
            let value = parse_tokens(raw)?;
            pairs.push((PENALTY_PER_DAY.to_string(), value.to_string()));
        }

        if pairs.is_empty() {
            return Err(Error::Validation("no settings supplied".to_string()));
        }
        Ok(pairs)
    }
}

fn parse_rate(raw: &str, key: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Validation(format!("{} must be a number, got {:?}", key, raw)))
}

/// Parse a caller-supplied token amount. Tokens are whole units.
pub fn parse_tokens(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return Ok(value);
    }

    // Accept "30.0" style input, reject fractions and negatives.
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => {
            if value > u64::MAX as f64 {
                Err(Error::Validation(format!("amount out of range: {}", raw)))
            } else {
                Ok(value as u64)
            }
        }
        Ok(_) => Err(Error::Validation(format!(
            "amount must be a whole, non-negative number of tokens: {}",
            raw
        ))),
        Err(_) => Err(Error::Validation(format!("invalid token amount: {:?}", raw))),
    }
}
