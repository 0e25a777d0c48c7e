//! Identifier generation for documents saved without an `_id`.
//!
//! The store never checks generated identifiers for uniqueness; a collision
//! silently overwrites the existing document.

use crate::error::{Error, Result};
use chrono::{Local, Utc};
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Number of digits produced by [`RandomDigits`].
pub const RANDOM_DIGITS_LEN: usize = 16;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Produces fresh document identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// A string of random decimal digits. The default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomDigits;

impl IdGenerator for RandomDigits {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..RANDOM_DIGITS_LEN)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

/// Local wall-clock time as `YYYYMMDDhhmmss`.
///
/// Only unique at one-second resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTime;

impl IdGenerator for DateTime {
    fn generate(&self) -> String {
        Local::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// UTC time as `YYYYMMDDhhmmss`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcDateTime;

impl IdGenerator for UtcDateTime {
    fn generate(&self) -> String {
        Utc::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Named identifier strategies, for configuration surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    #[default]
    Random,
    DateTime,
    UtcDateTime,
}

impl IdStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdStrategy::Random => "random",
            IdStrategy::DateTime => "datetime",
            IdStrategy::UtcDateTime => "utc-datetime",
        }
    }

    /// Build the generator for this strategy.
    pub fn generator(&self) -> Arc<dyn IdGenerator> {
        match self {
            IdStrategy::Random => Arc::new(RandomDigits),
            IdStrategy::DateTime => Arc::new(DateTime),
            IdStrategy::UtcDateTime => Arc::new(UtcDateTime),
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(IdStrategy::Random),
            "datetime" => Ok(IdStrategy::DateTime),
            "utc-datetime" | "utcdatetime" => Ok(IdStrategy::UtcDateTime),
            _ => Err(Error::unknown_id_strategy(s)),
        }
    }
}
