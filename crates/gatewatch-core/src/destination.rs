//! Collector destination selection.
//!
//! Load is spread across the configured collector hosts by picking one at
//! random, or by shuffling and taking a primary plus a fallback. The random
//! source is always passed in so selection can be made deterministic.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Collector hosts used when none are configured.
pub const DEFAULT_COLLECTOR_HOSTS: &[&str] = &[
    "rocknrolla.treblle.com",
    "punisher.treblle.com",
    "sicario.treblle.com",
];

/// Error raised while choosing or configuring a destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The selector holds no candidate hosts
    #[error("no collector hosts configured")]
    NoHosts,

    /// A selection mode name that is not recognised
    #[error("unknown selection mode '{0}'")]
    UnknownMode(String),
}

/// How many hosts to pick per exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionMode {
    /// One host chosen uniformly at random
    #[default]
    Single,
    /// Two distinct hosts from a shuffled list, the second as fallback
    PrimaryFallback,
}

impl FromStr for SelectionMode {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single" => Ok(Self::Single),
            "primary_fallback" | "fallback" => Ok(Self::PrimaryFallback),
            other => Err(SelectionError::UnknownMode(other.to_string())),
        }
    }
}

/// The chosen collector host(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    /// Host the dispatcher should try first
    pub primary: String,
    /// Host to try when the primary fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fallback {
            Some(fallback) => write!(f, "{} (fallback {})", self.primary, fallback),
            None => write!(f, "{}", self.primary),
        }
    }
}

/// Picks collector hosts from a fixed candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSelector {
    hosts: Vec<String>,
    mode: SelectionMode,
}

impl DestinationSelector {
    /// Create a selector. Blank host names are dropped.
    pub fn new(hosts: impl IntoIterator<Item = impl Into<String>>, mode: SelectionMode) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|h| {
                let host: String = h.into();
                host.trim().to_string()
            })
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts, mode }
    }

    /// Candidate hosts.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Selection mode.
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Choose the destination for one exchange.
    ///
    /// Fails only when there are no candidate hosts. In
    /// [`SelectionMode::PrimaryFallback`] with a single host, no fallback is
    /// returned.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Destination, SelectionError> {
        match self.mode {
            SelectionMode::Single => {
                let primary = self.hosts.choose(rng).ok_or(SelectionError::NoHosts)?;
                Ok(Destination {
                    primary: primary.clone(),
                    fallback: None,
                })
            }
            SelectionMode::PrimaryFallback => {
                let mut shuffled = self.hosts.clone();
                shuffled.shuffle(rng);
                let mut picked = shuffled.into_iter();
                let primary = picked.next().ok_or(SelectionError::NoHosts)?;
                Ok(Destination {
                    primary,
                    fallback: picked.next(),
                })
            }
        }
    }
}

impl Default for DestinationSelector {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR_HOSTS.iter().copied(), SelectionMode::Single)
    }
}
