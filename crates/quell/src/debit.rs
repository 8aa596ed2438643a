//! The accounting engine.
//!
//! Every account carries a virtual "next allowed time" instead of an
//! explicit token count: the balance seen by a debit is
//! `now - allow_time - allowance`, clamped to `[-window, +1s)`, and is
//! then re-encoded by rewriting `allow_time = now - balance`. Two
//! machine words per account, and the clamp is trivial.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use quell_cache::Outcome;

use crate::classify::ResponseTuple;
use crate::config::NANOS_PER_SECOND;
use crate::key::account_key;
use crate::prefix::mask_addr;
use crate::Rrl;

/// The recommendation returned by [`Rrl::debit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Send the planned response as-is.
    Send = 0,
    /// Do not send the planned response.
    Drop = 1,
    /// Send a truncated response, or BADCOOKIE if the query carried a
    /// client cookie.
    Slip = 2,
}

impl Action {
    /// Number of actions; sizes the statistics array.
    pub const COUNT: usize = 3;
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Send => "send",
            Self::Drop => "drop",
            Self::Slip => "slip",
        };
        f.write_str(name)
    }
}

/// State of client-network rate limiting when the action was decided.
/// Diagnostic only; the set of reasons may grow over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IpReason {
    /// The client network is within its limit.
    Ok = 0,
    /// `requests-per-second` is zero.
    NotConfigured = 1,
    /// Not currently reachable; reserved for future stages.
    NotReached = 2,
    /// The client network ran out of credit.
    RateLimit = 3,
    /// No room for a new client-network account.
    CacheFull = 4,
}

impl IpReason {
    /// Number of reasons; sizes the statistics array.
    pub const COUNT: usize = 5;
}

impl fmt::Display for IpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::NotConfigured => "not-configured",
            Self::NotReached => "not-reached",
            Self::RateLimit => "rate-limit",
            Self::CacheFull => "cache-full",
        };
        f.write_str(name)
    }
}

/// State of response-tuple rate limiting when the action was decided.
/// Diagnostic only; the set of reasons may grow over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RtReason {
    /// The account is in credit.
    Ok = 0,
    /// The allowance for this category is zero.
    NotConfigured = 1,
    /// An earlier stage already decided the action.
    NotReached = 2,
    /// The account ran out of credit.
    RateLimit = 3,
    /// Response-tuple accounting only applies to UDP.
    NotUdp = 4,
    /// No room for a new response-tuple account.
    CacheFull = 5,
}

impl RtReason {
    /// Number of reasons; sizes the statistics array.
    pub const COUNT: usize = 6;
}

impl fmt::Display for RtReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::NotConfigured => "not-configured",
            Self::NotReached => "not-reached",
            Self::RateLimit => "rate-limit",
            Self::NotUdp => "not-udp",
            Self::CacheFull => "cache-full",
        };
        f.write_str(name)
    }
}

/// The outcome of one [`Rrl::debit`] call: the recommended action plus
/// the per-stage reasons behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// What the caller should do with the response.
    pub action: Action,
    /// Why, from the client-network stage.
    pub ip: IpReason,
    /// Why, from the response-tuple stage.
    pub rt: RtReason,
}

/// The purported source of a query: a transport tag plus the textual
/// address-with-port, as reported by the listening socket.
///
/// Any transport tag beginning with `"udp"` (`"udp"`, `"udp4"`,
/// `"udp6"`) is subject to response-tuple accounting; all other
/// transports are assumed resistant to source-address spoofing and skip
/// that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr<'a> {
    transport: &'a str,
    addr: &'a str,
}

impl<'a> ClientAddr<'a> {
    /// Creates a client address from a transport tag and an
    /// `ip:port` / `[ip]:port` string.
    pub fn new(transport: &'a str, addr: &'a str) -> Self {
        Self { transport, addr }
    }

    /// The transport tag.
    pub fn transport(&self) -> &str {
        self.transport
    }

    /// The textual address-with-port.
    pub fn addr(&self) -> &str {
        self.addr
    }
}

impl fmt::Display for ClientAddr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.transport, self.addr)
    }
}

/// One rate-limiting account: the cache entry behind a key.
pub(crate) struct ResponseAccount {
    /// The instant at which the account is next fully in credit.
    pub(crate) allow_time: i64,
    /// Counts down rate-limited debits; the debit that reaches 1 slips
    /// and resets the countdown.
    pub(crate) slip_countdown: u32,
}

impl Rrl {
    /// Debits the accounts matching the client network and response
    /// tuple, returning the recommended action and the reasons for it.
    ///
    /// Call this immediately before transmitting a response, and only
    /// for queries that did not carry a valid server cookie (cookie
    /// validation is the caller's job). Safe for unbounded concurrent
    /// callers; work per call is bounded.
    pub fn debit(&self, src: &ClientAddr<'_>, tuple: &ResponseTuple) -> Decision {
        let decision = self.debit_stages(src, tuple);
        self.stats
            .lock()
            .record_debit(decision.action, decision.ip, decision.rt, tuple.category);
        decision
    }

    fn debit_stages(&self, src: &ClientAddr<'_>, tuple: &ResponseTuple) -> Decision {
        let mut ip = IpReason::NotConfigured;

        // Needed by both stages.
        let ip_prefix = mask_addr(
            src.addr,
            self.cfg.ipv4_prefix_length,
            self.cfg.ipv6_prefix_length,
        );

        // Client-network stage: applies to every transport, since it
        // limits the claimed source itself rather than the response.
        if self.cfg.requests_interval != 0 {
            match self.debit_account(self.cfg.requests_interval, &ip_prefix) {
                None => {
                    debug!(prefix = %ip_prefix, "client-network account shard full, dropping");
                    return Decision {
                        action: Action::Drop,
                        ip: IpReason::CacheFull,
                        rt: RtReason::NotReached,
                    };
                }
                Some((balance, _)) if balance < 0 => {
                    trace!(prefix = %ip_prefix, balance, "client network rate limited");
                    return Decision {
                        action: Action::Drop,
                        ip: IpReason::RateLimit,
                        rt: RtReason::NotReached,
                    };
                }
                Some(_) => ip = IpReason::Ok,
            }
        }

        // Response-tuple stage: UDP only. Other transports are assumed
        // resistant to source-address spoofing.
        if !src.transport.starts_with("udp") {
            return Decision {
                action: Action::Send,
                ip,
                rt: RtReason::NotUdp,
            };
        }

        let allowance = self.allowance_for(tuple.category);
        if allowance == 0 {
            return Decision {
                action: Action::Send,
                ip,
                rt: RtReason::NotConfigured,
            };
        }

        // Insulate against 0x20-style mixed-case queries.
        let name = tuple.salient_name.to_lowercase();
        let key = account_key(&ip_prefix, tuple.rtype, &name, tuple.category);

        match self.debit_account(allowance, &key) {
            None => {
                debug!(key = %key, "response-tuple account shard full, dropping");
                Decision {
                    action: Action::Drop,
                    ip,
                    rt: RtReason::CacheFull,
                }
            }
            Some((balance, slip)) if balance < 0 => {
                let action = if slip { Action::Slip } else { Action::Drop };
                trace!(key = %key, balance, %action, "response rate limited");
                Decision {
                    action,
                    ip,
                    rt: RtReason::RateLimit,
                }
            }
            Some(_) => Decision {
                action: Action::Send,
                ip,
                rt: RtReason::Ok,
            },
        }
    }

    /// Charges `allowance` against the account under `key`, creating the
    /// account on first contact. Returns the post-debit balance and
    /// whether this debit slips, or `None` when the shard is full and
    /// nothing could be evicted.
    fn debit_account(&self, allowance: i64, key: &str) -> Option<(i64, bool)> {
        let window = self.cfg.window;
        let slip_ratio = self.cfg.slip_ratio;
        let clock = &self.clock;

        let outcome = self.table.update_or_insert(
            key,
            |account: &mut ResponseAccount| {
                let now = clock.now_ns();
                let mut balance = now - account.allow_time - allowance;
                if balance >= NANOS_PER_SECOND {
                    // Positive balance cannot exceed one second.
                    balance = NANOS_PER_SECOND - allowance;
                } else if balance < -window {
                    // Negative balance cannot exceed the window.
                    balance = -window;
                }
                account.allow_time = now - balance;

                let slip = if balance > 0 || account.slip_countdown == 0 {
                    false
                } else if account.slip_countdown == 1 {
                    account.slip_countdown = slip_ratio;
                    true
                } else {
                    account.slip_countdown -= 1;
                    false
                };
                (balance, slip)
            },
            // A new account starts with one second of credit, less the
            // allowance for the debit that created it.
            || ResponseAccount {
                allow_time: clock.now_ns() - NANOS_PER_SECOND + allowance,
                slip_countdown: slip_ratio,
            },
        );

        match outcome {
            Outcome::Updated((balance, slip)) => Some((balance, slip)),
            Outcome::Inserted => Some((0, false)),
            Outcome::ShardFull => None,
        }
    }
}
