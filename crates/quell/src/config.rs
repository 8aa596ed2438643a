//! Rate limiter configuration.
//!
//! A [`Config`] is populated programmatically through [`Config::set`]
//! before being handed to [`Rrl::new`](crate::Rrl::new), which takes its
//! own copy. Keywords and ranges:
//!
//! | Keyword                | Type      | Range   | Default |
//! |------------------------|-----------|---------|---------|
//! | `window`               | int       | 1..3600 | 15      |
//! | `ipv4-prefix-length`   | int       | 1..32   | 24      |
//! | `ipv6-prefix-length`   | int       | 1..128  | 56      |
//! | `responses-per-second` | float >=0 |         | 0       |
//! | `nodata-per-second`    | float >=0 |         | responses-per-second |
//! | `nxdomains-per-second` | float >=0 |         | responses-per-second |
//! | `referrals-per-second` | float >=0 |         | responses-per-second |
//! | `errors-per-second`    | float >=0 |         | responses-per-second |
//! | `requests-per-second`  | float >=0 |         | 0       |
//! | `slip-ratio`           | int       | 0..10   | 2       |
//! | `max-table-size`       | int >=0   |         | 100000  |
//!
//! Per-second rates are stored pre-computed as nanoseconds-per-debit
//! (`1e9 / rate`); a rate of `0` stores `0`, meaning that limit is
//! disabled. `max-table-size` is a per-shard depth limit, not a global
//! one: the account cache always has 1024 shards, so total capacity is
//! 1024 times this value.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::TimeSource;

pub(crate) const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Configuration error returned by [`Config::set`]. The configuration is
/// unchanged whenever an error is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The keyword is not one the limiter knows.
    #[error("unknown keyword '{0}'")]
    UnknownKeyword(String),

    /// The argument could not be parsed or is outside the valid range.
    #[error("{keyword}='{value}': {message}")]
    InvalidValue {
        /// The keyword being set.
        keyword: String,
        /// The offending argument.
        value: String,
        /// What was wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn invalid(keyword: &str, value: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            keyword: keyword.to_string(),
            value: value.to_string(),
            message: message.into(),
        }
    }
}

/// Settings for one [`Rrl`](crate::Rrl) instance.
///
/// A default `Config` is effectively a no-op: every interval defaults to
/// zero, so no debit rule ever applies. Use [`Config::is_active`] to
/// check whether a configuration would cause any accounting at all.
#[derive(Clone)]
pub struct Config {
    pub(crate) window: i64,

    pub(crate) ipv4_prefix_length: u8,
    pub(crate) ipv6_prefix_length: u8,

    pub(crate) responses_interval: i64,
    pub(crate) nodata_interval: i64,
    pub(crate) nxdomains_interval: i64,
    pub(crate) referrals_interval: i64,
    pub(crate) errors_interval: i64,
    pub(crate) requests_interval: i64,

    pub(crate) slip_ratio: u32,
    pub(crate) max_table_size: usize,

    // Explicit-set markers checked by finalize().
    nodata_set: bool,
    nxdomains_set: bool,
    referrals_set: bool,
    errors_set: bool,

    pub(crate) clock: Option<Arc<dyn TimeSource>>,
}

impl Config {
    /// Returns a configuration with all defaults in place.
    pub fn new() -> Self {
        Self {
            window: 15 * NANOS_PER_SECOND,
            ipv4_prefix_length: 24,
            ipv6_prefix_length: 56,
            responses_interval: 0,
            nodata_interval: 0,
            nxdomains_interval: 0,
            referrals_interval: 0,
            errors_interval: 0,
            requests_interval: 0,
            slip_ratio: 2,
            max_table_size: 100_000,
            nodata_set: false,
            nxdomains_set: false,
            referrals_set: false,
            errors_set: false,
            clock: None,
        }
    }

    /// Validates and assigns the argument for `keyword`.
    ///
    /// Unknown keywords, unparseable arguments, and out-of-range values
    /// all fail with a descriptive [`ConfigError`], leaving the
    /// configuration untouched.
    pub fn set(&mut self, keyword: &str, arg: &str) -> Result<(), ConfigError> {
        match keyword {
            "window" => {
                let w = parse_int(keyword, arg)?;
                if !(1..=3600).contains(&w) {
                    return Err(ConfigError::invalid(keyword, arg, "must be between 1 and 3600"));
                }
                self.window = w * NANOS_PER_SECOND;
            }

            "ipv4-prefix-length" => {
                let bits = parse_int(keyword, arg)?;
                if !(1..=32).contains(&bits) {
                    return Err(ConfigError::invalid(keyword, arg, "must be between 1 and 32"));
                }
                self.ipv4_prefix_length = bits as u8;
            }

            "ipv6-prefix-length" => {
                let bits = parse_int(keyword, arg)?;
                if !(1..=128).contains(&bits) {
                    return Err(ConfigError::invalid(keyword, arg, "must be between 1 and 128"));
                }
                self.ipv6_prefix_length = bits as u8;
            }

            "responses-per-second" => self.responses_interval = parse_interval(keyword, arg)?,

            "nodata-per-second" => {
                self.nodata_interval = parse_interval(keyword, arg)?;
                self.nodata_set = true;
            }

            "nxdomains-per-second" => {
                self.nxdomains_interval = parse_interval(keyword, arg)?;
                self.nxdomains_set = true;
            }

            "referrals-per-second" => {
                self.referrals_interval = parse_interval(keyword, arg)?;
                self.referrals_set = true;
            }

            "errors-per-second" => {
                self.errors_interval = parse_interval(keyword, arg)?;
                self.errors_set = true;
            }

            "requests-per-second" => self.requests_interval = parse_interval(keyword, arg)?,

            "slip-ratio" => {
                let ratio = parse_int(keyword, arg)?;
                if !(0..=10).contains(&ratio) {
                    return Err(ConfigError::invalid(keyword, arg, "must be between 0 and 10"));
                }
                self.slip_ratio = ratio as u32;
            }

            "max-table-size" => {
                let size = parse_int(keyword, arg)?;
                if size < 0 {
                    return Err(ConfigError::invalid(keyword, arg, "cannot be negative"));
                }
                self.max_table_size = size as usize;
            }

            _ => return Err(ConfigError::UnknownKeyword(keyword.to_string())),
        }

        Ok(())
    }

    /// Replaces the clock used for all balance arithmetic and eviction
    /// decisions. Mainly intended for tests; see [`ManualClock`].
    ///
    /// [`ManualClock`]: crate::ManualClock
    pub fn set_clock(&mut self, clock: Arc<dyn TimeSource>) {
        self.clock = Some(clock);
    }

    /// Returns true if at least one interval is set, i.e. a limiter built
    /// from this configuration would evaluate accounts at all.
    pub fn is_active(&self) -> bool {
        self.responses_interval > 0
            || self.nodata_interval > 0
            || self.nxdomains_interval > 0
            || self.referrals_interval > 0
            || self.errors_interval > 0
            || self.requests_interval > 0
    }

    /// Resolves deferred defaults. Called when the configuration is
    /// copied into an [`Rrl`](crate::Rrl): per-category intervals not
    /// explicitly set inherit `responses-per-second`.
    pub(crate) fn finalize(&mut self) {
        if !self.nodata_set {
            self.nodata_interval = self.responses_interval;
        }
        if !self.nxdomains_set {
            self.nxdomains_interval = self.responses_interval;
        }
        if !self.referrals_set {
            self.referrals_interval = self.responses_interval;
        }
        if !self.errors_set {
            self.errors_interval = self.responses_interval;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-line dump of the internal values, per-second rates shown as
/// their stored nanosecond decrements.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{} {}/{}/{}/{}/{}/{} {}/{} {}/{}/{}/{}",
            self.window,
            self.ipv4_prefix_length,
            self.ipv6_prefix_length,
            self.responses_interval,
            self.nodata_interval,
            self.nxdomains_interval,
            self.referrals_interval,
            self.errors_interval,
            self.requests_interval,
            self.slip_ratio,
            self.max_table_size,
            self.nodata_set,
            self.nxdomains_set,
            self.referrals_set,
            self.errors_set,
        )
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("window", &self.window)
            .field("ipv4_prefix_length", &self.ipv4_prefix_length)
            .field("ipv6_prefix_length", &self.ipv6_prefix_length)
            .field("responses_interval", &self.responses_interval)
            .field("nodata_interval", &self.nodata_interval)
            .field("nxdomains_interval", &self.nxdomains_interval)
            .field("referrals_interval", &self.referrals_interval)
            .field("errors_interval", &self.errors_interval)
            .field("requests_interval", &self.requests_interval)
            .field("slip_ratio", &self.slip_ratio)
            .field("max_table_size", &self.max_table_size)
            .field("custom_clock", &self.clock.is_some())
            .finish()
    }
}

fn parse_int(keyword: &str, arg: &str) -> Result<i64, ConfigError> {
    arg.parse::<i64>()
        .map_err(|e| ConfigError::invalid(keyword, arg, e.to_string()))
}

/// Converts a per-second rate into the nanoseconds to charge per debit.
fn parse_interval(keyword: &str, arg: &str) -> Result<i64, ConfigError> {
    let rate = arg
        .parse::<f64>()
        .map_err(|e| ConfigError::invalid(keyword, arg, e.to_string()))?;
    if rate.is_nan() || rate < 0.0 {
        return Err(ConfigError::invalid(keyword, arg, "cannot be negative"));
    }
    if rate == 0.0 {
        Ok(0)
    } else {
        Ok((NANOS_PER_SECOND as f64 / rate) as i64)
    }
}
