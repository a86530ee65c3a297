//! Capability-based security for host functions.
//!
//! Guests get no ambient authority. Every host function a guest can import
//! is gated behind a capability token the caller must grant explicitly.
//!
//! # Security Philosophy
//!
//! We follow the principle of least privilege:
//! - By default, nothing is granted
//! - Each capability must be granted explicitly per call
//! - `filesystem_write` implies `filesystem_read`; nothing else implies
//!   anything
//! - Grants are immutable during execution

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A capability token a caller can grant to a guest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read the host wall clock.
    Time,
    /// Draw host entropy.
    Random,
    /// Emit log records through the host.
    Log,
    /// Read from the host filesystem (no exports in this core).
    FilesystemRead,
    /// Write to the host filesystem (no exports in this core).
    FilesystemWrite,
    /// Open network connections (no exports in this core).
    Network,
    /// A named caller-provided host function.
    HostFunction(String),
}

impl Capability {
    /// Human description of what the token grants.
    pub fn describe(&self) -> String {
        match self {
            Capability::Time => "read the host wall clock in milliseconds".into(),
            Capability::Random => "draw random integers from host entropy".into(),
            Capability::Log => "emit log records at debug/info/warn/error".into(),
            Capability::FilesystemRead => "read files on the host filesystem".into(),
            Capability::FilesystemWrite => {
                "write files on the host filesystem (implies read)".into()
            }
            Capability::Network => "open outbound network connections".into(),
            Capability::HostFunction(name) => format!("call the host function '{name}'"),
        }
    }

    /// Fixed risk class of the token.
    ///
    /// Anything whose blast radius we cannot bound ahead of time is `High`.
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            Capability::Time | Capability::Random | Capability::Log => RiskLevel::Low,
            Capability::FilesystemRead => RiskLevel::Medium,
            Capability::FilesystemWrite | Capability::Network => RiskLevel::High,
            Capability::HostFunction(_) => RiskLevel::High,
        }
    }
}

impl FromStr for Capability {
    type Err = CapabilityError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "time" => Ok(Capability::Time),
            "random" => Ok(Capability::Random),
            "log" => Ok(Capability::Log),
            "filesystem_read" => Ok(Capability::FilesystemRead),
            "filesystem_write" => Ok(Capability::FilesystemWrite),
            "network" => Ok(Capability::Network),
            other => {
                // host_function(name)
                if let Some(inner) = other
                    .strip_prefix("host_function(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    if !inner.is_empty() {
                        return Ok(Capability::HostFunction(inner.to_string()));
                    }
                }
                Err(CapabilityError::UnknownToken {
                    token: other.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Time => write!(f, "time"),
            Capability::Random => write!(f, "random"),
            Capability::Log => write!(f, "log"),
            Capability::FilesystemRead => write!(f, "filesystem_read"),
            Capability::FilesystemWrite => write!(f, "filesystem_write"),
            Capability::Network => write!(f, "network"),
            Capability::HostFunction(name) => write!(f, "host_function({name})"),
        }
    }
}

/// Risk class of a capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Observes the host but cannot change it.
    Low,
    /// Reads host state beyond the sandbox.
    Medium,
    /// Mutates host state or reaches beyond the machine.
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Capability validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// A token string is not part of the capability vocabulary.
    #[error("unknown capability token '{token}'")]
    UnknownToken {
        /// The rejected token.
        token: String,
    },

    /// A token set contained one or more unknown entries.
    #[error("invalid capability tokens: {}", tokens.join(", "))]
    InvalidTokens {
        /// All rejected tokens, in input order.
        tokens: Vec<String>,
    },
}

/// A set of capabilities granted to one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    caps: HashSet<Capability>,
}

impl CapabilitySet {
    /// Create an empty set (nothing granted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a set from string tokens, rejecting unknown atoms.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidTokens`] listing every token that
    /// failed to parse; valid tokens in the same input are not granted.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut caps = HashSet::new();
        let mut rejected = Vec::new();
        for token in tokens {
            match token.as_ref().parse::<Capability>() {
                Ok(cap) => {
                    caps.insert(cap);
                }
                Err(_) => rejected.push(token.as_ref().to_string()),
            }
        }
        if !rejected.is_empty() {
            return Err(CapabilityError::InvalidTokens { tokens: rejected });
        }
        Ok(Self { caps })
    }

    /// Grant a capability.
    pub fn grant(&mut self, cap: Capability) {
        self.caps.insert(cap);
    }

    /// Builder-style grant.
    #[must_use]
    pub fn with(mut self, cap: Capability) -> Self {
        self.grant(cap);
        self
    }

    /// Check direct membership (no implication applied).
    pub fn contains(&self, cap: &Capability) -> bool {
        self.caps.contains(cap)
    }

    /// Apply capability implications and return the closed set.
    ///
    /// `filesystem_write → filesystem_read`; every other token maps to
    /// itself.
    pub fn expand(&self) -> CapabilitySet {
        let mut caps = self.caps.clone();
        if caps.contains(&Capability::FilesystemWrite) {
            caps.insert(Capability::FilesystemRead);
        }
        CapabilitySet { caps }
    }

    /// Check whether every requested capability is covered by this grant,
    /// after expansion.
    pub fn includes(&self, requested: &CapabilitySet) -> bool {
        let expanded = self.expand();
        requested.caps.iter().all(|cap| expanded.caps.contains(cap))
    }

    /// Iterate over the granted tokens (unspecified order).
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.iter()
    }

    /// Number of granted tokens.
    pub fn len(&self) -> usize {
        self.caps.len()
    }

    /// Whether nothing is granted.
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            caps: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tokens() {
        assert_eq!("time".parse::<Capability>().unwrap(), Capability::Time);
        assert_eq!("random".parse::<Capability>().unwrap(), Capability::Random);
        assert_eq!("log".parse::<Capability>().unwrap(), Capability::Log);
        assert_eq!(
            "filesystem_write".parse::<Capability>().unwrap(),
            Capability::FilesystemWrite
        );
        assert_eq!(
            "host_function(lookup)".parse::<Capability>().unwrap(),
            Capability::HostFunction("lookup".into())
        );
    }

    #[test]
    fn test_parse_unknown_token() {
        let err = "telepathy".parse::<Capability>().unwrap_err();
        assert_eq!(
            err,
            CapabilityError::UnknownToken {
                token: "telepathy".into()
            }
        );
        // Empty host function name is not a token either.
        assert!("host_function()".parse::<Capability>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for cap in [
            Capability::Time,
            Capability::Random,
            Capability::Log,
            Capability::FilesystemRead,
            Capability::FilesystemWrite,
            Capability::Network,
            Capability::HostFunction("lookup".into()),
        ] {
            assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(Capability::Time.risk_level(), RiskLevel::Low);
        assert_eq!(Capability::Log.risk_level(), RiskLevel::Low);
        assert_eq!(Capability::FilesystemRead.risk_level(), RiskLevel::Medium);
        assert_eq!(Capability::FilesystemWrite.risk_level(), RiskLevel::High);
        assert_eq!(Capability::Network.risk_level(), RiskLevel::High);
        assert_eq!(
            Capability::HostFunction("x".into()).risk_level(),
            RiskLevel::High
        );
    }

    #[test]
    fn test_from_tokens_collects_all_invalid() {
        let err = CapabilitySet::from_tokens(["time", "warp", "log", "blink"]).unwrap_err();
        assert_eq!(
            err,
            CapabilityError::InvalidTokens {
                tokens: vec!["warp".into(), "blink".into()]
            }
        );
    }

    #[test]
    fn test_expand_write_implies_read() {
        let set = CapabilitySet::new().with(Capability::FilesystemWrite);
        let expanded = set.expand();

        assert!(expanded.contains(&Capability::FilesystemWrite));
        assert!(expanded.contains(&Capability::FilesystemRead));
        assert_eq!(expanded.len(), 2);
    }

    #[test]
    fn test_expand_identity_for_others() {
        let set = CapabilitySet::new()
            .with(Capability::Time)
            .with(Capability::Log);
        assert_eq!(set.expand(), set);
    }

    #[test]
    fn test_includes_uses_expansion() {
        let granted = CapabilitySet::new().with(Capability::FilesystemWrite);
        let requested = CapabilitySet::new().with(Capability::FilesystemRead);

        assert!(granted.includes(&requested));
        assert!(!requested.includes(&granted));
    }

    #[test]
    fn test_duplicate_grants_collapse() {
        let mut set = CapabilitySet::new();
        set.grant(Capability::Time);
        set.grant(Capability::Time);
        assert_eq!(set.len(), 1);
    }
}
