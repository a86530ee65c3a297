//! Fuel policy: budgets, complexity tiers, and validation.
//!
//! Fuel is the synthetic currency charged per guest instruction. The policy
//! resolves defaults from process configuration and validates caller-supplied
//! budgets before any engine work happens.

use thiserror::Error;

use crate::config::ExecutionConfig;

/// The largest fuel budget a single call may request.
pub const MAX_FUEL: u64 = 100_000_000;

/// Rough complexity tiers for callers that do not want to size budgets
/// themselves.
///
/// A typical simple function consumes ~1,000-10,000 fuel. Complex
/// operations may consume millions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityTier {
    /// Constant-time arithmetic, small lookups.
    Trivial,
    /// Short loops, small buffer manipulation.
    Simple,
    /// String processing, moderate iteration counts.
    Moderate,
    /// Heavy iteration, recursive descent.
    Complex,
    /// Large-input number crunching.
    Heavy,
}

impl ComplexityTier {
    /// The fuel budget for this tier.
    pub fn fuel(&self) -> u64 {
        match self {
            ComplexityTier::Trivial => 1_000,
            ComplexityTier::Simple => 10_000,
            ComplexityTier::Moderate => 100_000,
            ComplexityTier::Complex => 1_000_000,
            ComplexityTier::Heavy => 10_000_000,
        }
    }
}

/// A rejected fuel budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FuelError {
    /// Zero fuel would never execute an instruction.
    #[error("fuel budget must be positive")]
    NotPositive,

    /// The requested budget exceeds [`MAX_FUEL`].
    #[error("fuel budget {requested} exceeds maximum {MAX_FUEL}")]
    ExceedsMaximum {
        /// The budget the caller asked for.
        requested: u64,
    },
}

/// Process-wide fuel and deadline defaults, resolved once at initialization
/// and overridable per call.
#[derive(Debug, Clone, Copy)]
pub struct FuelPolicy {
    default_fuel: u64,
    default_timeout_ms: u64,
}

impl FuelPolicy {
    /// Build a policy from execution configuration.
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            default_fuel: config.default_fuel,
            default_timeout_ms: config.default_timeout_ms,
        }
    }

    /// The fuel budget used when a caller omits one.
    pub fn default_fuel(&self) -> u64 {
        self.default_fuel
    }

    /// The wall-clock deadline used when a caller omits one.
    pub fn default_timeout_ms(&self) -> u64 {
        self.default_timeout_ms
    }

    /// The fuel budget for a complexity tier.
    pub fn fuel_for(&self, tier: ComplexityTier) -> u64 {
        tier.fuel()
    }

    /// Validate a caller-supplied fuel budget.
    pub fn validate(&self, fuel: u64) -> Result<(), FuelError> {
        validate_fuel(fuel)
    }
}

impl Default for FuelPolicy {
    fn default() -> Self {
        Self::new(&ExecutionConfig::default())
    }
}

/// Validate a fuel budget against the policy bounds.
pub fn validate_fuel(fuel: u64) -> Result<(), FuelError> {
    if fuel == 0 {
        return Err(FuelError::NotPositive);
    }
    if fuel > MAX_FUEL {
        return Err(FuelError::ExceedsMaximum { requested: fuel });
    }
    Ok(())
}
