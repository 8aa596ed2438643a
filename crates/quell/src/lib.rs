//! # Quell
//!
//! Response Rate Limiting (RRL) for authoritative DNS servers.
//!
//! RRL diminishes a server's value as an amplification vector: the
//! server asks this library — immediately before transmitting a UDP
//! response — whether to send the response as planned, drop it, or
//! "slip" a truncated/BADCOOKIE response that still gives genuine
//! queriers an occasional breakthrough.
//!
//! ## Usage
//!
//! Build a [`Config`], construct one process-lifetime [`Rrl`], and call
//! [`Rrl::debit`] before each response:
//!
//! ```rust
//! use quell::{Action, AllowanceCategory, ClientAddr, Config, ResponseTuple, Rrl};
//!
//! let mut cfg = Config::new();
//! cfg.set("responses-per-second", "20").unwrap();
//! cfg.set("slip-ratio", "2").unwrap();
//! let rrl = Rrl::new(cfg);
//!
//! let src = ClientAddr::new("udp", "192.0.2.7:4096");
//! let tuple = ResponseTuple::new(1, 1, AllowanceCategory::Answer, "example.com.");
//! match rrl.debit(&src, &tuple).action {
//!     Action::Send => { /* transmit as planned */ }
//!     Action::Drop => { /* stay silent */ }
//!     Action::Slip => { /* truncated or BADCOOKIE response */ }
//! }
//! ```
//!
//! Only call [`Rrl::debit`] for queries without a valid server cookie;
//! cookie validation is the caller's responsibility, as is deriving the
//! [`ResponseTuple`] (in particular the salient name — see the rules on
//! that type).
//!
//! ## Accounting model
//!
//! Each response is collapsed into an [`AllowanceCategory`] and charged
//! against an account keyed by (client network, response fingerprint).
//! An account earns its configured allowance once per second, may bank
//! at most one second of credit, and may run at most `window` seconds
//! into debt. While an account is in credit, debits recommend
//! [`Action::Send`]; once it is exhausted they recommend
//! [`Action::Drop`], with every `slip-ratio`-th rate-limited debit
//! slipping through as [`Action::Slip`].
//!
//! Accounts live in a fixed-capacity 1024-shard cache ([`quell_cache`]);
//! stale accounts are reclaimed opportunistically when insertion
//! pressure hits a full shard, so memory stays bounded under sustained
//! attack without any background task.
//!
//! ## Concurrency
//!
//! An [`Rrl`] is safe for unbounded concurrent use; normally one
//! instance is shared across the whole server. Debits against the same
//! account are serialized by its shard lock, and a debit performs at
//! most one bounded eviction scan, so every call is finite-wait.

mod classify;
mod clock;
mod config;
mod debit;
mod key;
mod prefix;
mod stats;

pub use classify::{AllowanceCategory, ResponseTuple};
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use config::{Config, ConfigError};
pub use debit::{Action, ClientAddr, Decision, IpReason, RtReason};
pub use stats::Stats;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use quell_cache::Cache;

use debit::ResponseAccount;

/// A configured rate limiter: the account database plus its counters.
///
/// Created once per deployment with [`Rrl::new`] and shared for the life
/// of the process. Multiple instances operate fully independently.
pub struct Rrl {
    cfg: Config,
    clock: Arc<dyn TimeSource>,
    table: Cache<ResponseAccount>,
    stats: Arc<Mutex<Stats>>,
}

impl Rrl {
    /// Builds a rate limiter from `cfg`.
    ///
    /// The configuration is finalized (unset per-category intervals
    /// inherit `responses-per-second`, the system clock is installed if
    /// none was injected) and copied in; the caller's copy can no longer
    /// influence this instance.
    pub fn new(mut cfg: Config) -> Self {
        cfg.finalize();
        let clock: Arc<dyn TimeSource> = match cfg.clock.clone() {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let stats = Arc::new(Mutex::new(Stats::default()));

        // An account is reclaimable once it has sat at maximum positive
        // credit for a whole window.
        let window = cfg.window;
        let evict_clock = Arc::clone(&clock);
        let evict_stats = Arc::clone(&stats);
        let table = Cache::new(
            cfg.max_table_size,
            Box::new(move |account: &ResponseAccount| {
                let expired = evict_clock.now_ns() - account.allow_time >= window;
                if expired {
                    evict_stats.lock().evictions += 1;
                }
                expired
            }),
        );

        debug!(config = %cfg, "rate limiter ready");

        Self {
            cfg,
            clock,
            table,
            stats,
        }
    }

    /// Returns a deep copy of the counters accumulated by
    /// [`Rrl::debit`], with `cache_length` reflecting the live account
    /// count at the time of the call.
    ///
    /// With `zero_after`, all counters are reset; the live cache length
    /// is unaffected by the reset.
    pub fn snapshot(&self, zero_after: bool) -> Stats {
        let mut snap = {
            let mut stats = self.stats.lock();
            if zero_after {
                std::mem::take(&mut *stats)
            } else {
                stats.clone()
            }
        };
        snap.cache_length = self.table.len();
        snap
    }

    /// The configured nanosecond allowance for `category`.
    pub(crate) fn allowance_for(&self, category: AllowanceCategory) -> i64 {
        match category {
            AllowanceCategory::Answer => self.cfg.responses_interval,
            AllowanceCategory::NoData => self.cfg.nodata_interval,
            AllowanceCategory::NXDomain => self.cfg.nxdomains_interval,
            AllowanceCategory::Referral => self.cfg.referrals_interval,
            AllowanceCategory::Error => self.cfg.errors_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowance_follows_config() {
        let mut cfg = Config::new();
        cfg.set("responses-per-second", "1").unwrap();
        cfg.set("nxdomains-per-second", "4").unwrap();
        let rrl = Rrl::new(cfg);

        assert_eq!(rrl.allowance_for(AllowanceCategory::Answer), 1_000_000_000);
        assert_eq!(rrl.allowance_for(AllowanceCategory::NXDomain), 250_000_000);
        // Unset categories inherited responses-per-second at finalize.
        assert_eq!(rrl.allowance_for(AllowanceCategory::Error), 1_000_000_000);
    }

    #[test]
    fn test_snapshot_reports_live_length() {
        let mut cfg = Config::new();
        cfg.set("responses-per-second", "10").unwrap();
        let rrl = Rrl::new(cfg);

        let src = ClientAddr::new("udp", "127.0.0.1:53");
        let tuple = ResponseTuple::new(1, 1, AllowanceCategory::Answer, "example.com.");
        rrl.debit(&src, &tuple);

        let snap = rrl.snapshot(true);
        assert_eq!(snap.cache_length, 1);

        // Counters were zeroed, but the accounts are still live.
        let snap = rrl.snapshot(false);
        assert_eq!(snap.actions, [0, 0, 0]);
        assert_eq!(snap.cache_length, 1);
    }
}
