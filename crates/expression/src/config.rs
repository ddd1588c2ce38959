//! Evaluator configuration.

use std::str::FromStr;

use chrono_tz::Tz;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

use crate::error::{ExpressionError, ExpressionResult};

/// How operators treat `null` operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationMode {
    /// `null` where a value is required is an error
    #[default]
    Strict,
    /// `null` behaves as a defined default: `0` in arithmetic, `false` in
    /// comparisons and logic
    NonStrict,
}

impl FromStr for EvaluationMode {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "non-strict" | "non_strict" | "nonstrict" => Ok(Self::NonStrict),
            other => Err(ExpressionError::config(format!(
                "unknown evaluation mode '{other}'"
            ))),
        }
    }
}

/// Rounding applied when a decimal result exceeds the configured precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingMode {
    /// Round to nearest, ties to even
    #[default]
    HalfEven,
    /// Round to nearest, ties away from zero
    HalfUp,
    /// Round to nearest, ties towards zero
    HalfDown,
    /// Towards zero
    Down,
    /// Away from zero
    Up,
}

impl RoundingMode {
    /// Matching `rust_decimal` strategy.
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::HalfDown => RoundingStrategy::MidpointTowardZero,
            Self::Down => RoundingStrategy::ToZero,
            Self::Up => RoundingStrategy::AwayFromZero,
        }
    }
}

/// Precision of `/`, `%` and `**`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimalPolicy {
    /// Significant digits kept in a result
    pub significant_digits: u32,
    /// Rounding applied to the dropped digits
    pub rounding: RoundingMode,
}

impl Default for DecimalPolicy {
    fn default() -> Self {
        Self {
            significant_digits: 16,
            rounding: RoundingMode::HalfEven,
        }
    }
}

/// Evaluator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Null handling
    pub mode: EvaluationMode,
    /// Map scalar-parameter functions over collection arguments
    pub automatic_iteration: bool,
    /// Decimal precision policy
    pub decimal: DecimalPolicy,
    /// IANA time zone used by `Today()` and `Now()`
    pub time_zone: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::Strict,
            automatic_iteration: false,
            decimal: DecimalPolicy::default(),
            time_zone: "UTC".to_string(),
        }
    }
}

impl EvaluationConfig {
    /// Strict evaluation, no automatic iteration
    pub fn strict() -> Self {
        Self::default()
    }

    /// Non-strict evaluation with automatic iteration
    pub fn non_strict() -> Self {
        Self {
            mode: EvaluationMode::NonStrict,
            automatic_iteration: true,
            ..Self::default()
        }
    }

    /// Defaults overridden from `VERDICT_EVAL_MODE`, `VERDICT_AUTO_ITERATION`,
    /// `VERDICT_DECIMAL_DIGITS` and `VERDICT_TIME_ZONE`.
    pub fn from_env() -> ExpressionResult<Self> {
        let mut config = Self::default();

        if let Ok(mode) = std::env::var("VERDICT_EVAL_MODE") {
            config.mode = mode.parse()?;
        }

        if let Ok(flag) = std::env::var("VERDICT_AUTO_ITERATION") {
            config.automatic_iteration = flag
                .trim()
                .parse()
                .map_err(|_| ExpressionError::config("Invalid VERDICT_AUTO_ITERATION"))?;
        }

        if let Ok(digits) = std::env::var("VERDICT_DECIMAL_DIGITS") {
            config.decimal.significant_digits = digits
                .trim()
                .parse()
                .map_err(|_| ExpressionError::config("Invalid VERDICT_DECIMAL_DIGITS"))?;
        }

        if let Ok(zone) = std::env::var("VERDICT_TIME_ZONE") {
            config.time_zone = zone.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the time zone name.
    pub fn validate(&self) -> ExpressionResult<()> {
        if !(1..=28).contains(&self.decimal.significant_digits) {
            return Err(ExpressionError::config(format!(
                "significant digits must be between 1 and 28, got {}",
                self.decimal.significant_digits
            )));
        }
        self.tz().map(|_| ())
    }

    /// Parsed time zone.
    pub fn tz(&self) -> ExpressionResult<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ExpressionError::config(format!("unknown time zone '{}'", self.time_zone)))
    }

    /// Whether `null` operands are errors.
    pub fn is_strict(&self) -> bool {
        self.mode == EvaluationMode::Strict
    }
}
