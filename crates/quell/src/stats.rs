//! Debit outcome counters.

use std::fmt;

use serde::Serialize;

use crate::classify::AllowanceCategory;
use crate::debit::{Action, IpReason, RtReason};

/// Counters accumulated by [`Rrl::debit`](crate::Rrl::debit) calls.
///
/// Every debit increments exactly one counter in each of `rps`,
/// `actions`, `ip_reasons`, and `rt_reasons`. A snapshot is obtained via
/// [`Rrl::snapshot`](crate::Rrl::snapshot), which also fills in
/// `cache_length`; concurrency protection is the instance's job, not
/// this struct's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Debits by allowance category, in category order
    /// (answer, referral, nodata, nxdomain, error).
    pub rps: [u64; AllowanceCategory::COUNT],

    /// Recommended actions, in order (send, drop, slip).
    pub actions: [u64; Action::COUNT],

    /// IP-stage outcomes, in order
    /// (ok, not-configured, not-reached, rate-limit, cache-full).
    pub ip_reasons: [u64; IpReason::COUNT],

    /// Response-tuple-stage outcomes, in order
    /// (ok, not-configured, not-reached, rate-limit, not-udp, cache-full).
    pub rt_reasons: [u64; RtReason::COUNT],

    /// Live account count at snapshot time; never accumulated.
    pub cache_length: usize,

    /// Accounts removed by the eviction predicate since the last zero.
    pub evictions: u64,
}

impl Stats {
    pub(crate) fn record_debit(
        &mut self,
        action: Action,
        ip: IpReason,
        rt: RtReason,
        category: AllowanceCategory,
    ) {
        self.rps[category as usize] += 1;
        self.actions[action as usize] += 1;
        self.ip_reasons[ip as usize] += 1;
        self.rt_reasons[rt as usize] += 1;
    }

    /// Folds another snapshot into this one, for callers aggregating
    /// several instances. `cache_length` is taken from `other` rather
    /// than summed, since it is a point-in-time reading.
    pub fn add(&mut self, other: &Stats) {
        for (acc, v) in self.rps.iter_mut().zip(other.rps) {
            *acc += v;
        }
        for (acc, v) in self.actions.iter_mut().zip(other.actions) {
            *acc += v;
        }
        for (acc, v) in self.ip_reasons.iter_mut().zip(other.ip_reasons) {
            *acc += v;
        }
        for (acc, v) in self.rt_reasons.iter_mut().zip(other.rt_reasons) {
            *acc += v;
        }
        self.cache_length = other.cache_length;
        self.evictions += other.evictions;
    }
}

/// One-line debug form:
/// `RPS a/r/nd/nx/e Actions s/d/sl IPR ok/nc/nr/rl/cf RTR ok/nc/nr/rl/nu/cf L=len/evict`.
impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RPS {}/{}/{}/{}/{} Actions {}/{}/{} IPR {}/{}/{}/{}/{} RTR {}/{}/{}/{}/{}/{} L={}/{}",
            self.rps[0],
            self.rps[1],
            self.rps[2],
            self.rps[3],
            self.rps[4],
            self.actions[0],
            self.actions[1],
            self.actions[2],
            self.ip_reasons[0],
            self.ip_reasons[1],
            self.ip_reasons[2],
            self.ip_reasons[3],
            self.ip_reasons[4],
            self.rt_reasons[0],
            self.rt_reasons[1],
            self.rt_reasons[2],
            self.rt_reasons[3],
            self.rt_reasons[4],
            self.rt_reasons[5],
            self.cache_length,
            self.evictions,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_zero() {
        let stats = Stats::default();
        assert_eq!(
            stats.to_string(),
            "RPS 0/0/0/0/0 Actions 0/0/0 IPR 0/0/0/0/0 RTR 0/0/0/0/0/0 L=0/0"
        );
    }

    #[test]
    fn test_record_debit() {
        let mut stats = Stats::default();

        stats.record_debit(
            Action::Send,
            IpReason::Ok,
            RtReason::Ok,
            AllowanceCategory::Answer,
        );
        assert_eq!(
            stats.to_string(),
            "RPS 1/0/0/0/0 Actions 1/0/0 IPR 1/0/0/0/0 RTR 1/0/0/0/0/0 L=0/0"
        );

        stats.record_debit(
            Action::Slip,
            IpReason::CacheFull,
            RtReason::CacheFull,
            AllowanceCategory::Error,
        );
        assert_eq!(
            stats.to_string(),
            "RPS 1/0/0/0/1 Actions 1/0/1 IPR 1/0/0/0/1 RTR 1/0/0/0/0/1 L=0/0"
        );
    }

    #[test]
    fn test_add() {
        let mut a = Stats::default();
        a.rps[0] = 1;
        a.actions[1] = 6;
        a.actions[2] = 7;
        a.ip_reasons[2] = 2;
        a.rt_reasons[1] = 3;
        a.cache_length = 4;
        a.evictions = 5;

        let mut b = Stats::default();
        b.add(&a);
        b.cache_length = 0;
        b.add(&a);

        assert_eq!(
            b.to_string(),
            "RPS 2/0/0/0/0 Actions 0/12/14 IPR 0/0/4/0/0 RTR 0/6/0/0/0/0 L=4/10"
        );
    }
}
