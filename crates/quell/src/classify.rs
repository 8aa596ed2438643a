//! Response classification.
//!
//! A response is collapsed into one of five allowance categories before
//! accounting. The goal of the collapse is asymmetry: responses
//! indicative of abuse (NXDOMAIN storms, server errors) fold into few
//! accounts that drain quickly, while genuine traffic spreads across
//! many accounts that rarely run dry.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// The distillation of a response into an accounting category.
///
/// Each category carries its own configurable allowance
/// (`responses-per-second`, `referrals-per-second`, and so on). The
/// selection rules, evaluated top to bottom:
///
/// | Category   | rcode | answers | authority |
/// |------------|-------|---------|-----------|
/// | `Answer`   | 0     | > 0     |           |
/// | `Referral` | 0     | 0       | > 0       |
/// | `NoData`   | 0     | 0       | 0         |
/// | `NXDomain` | 3     |         |           |
/// | `Error`    | any other combination       |
///
/// The discriminants are stable: they appear in textual account keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AllowanceCategory {
    /// Non-empty answer for a valid name and type.
    Answer = 0,
    /// Referral or delegation to the server of a given domain.
    Referral = 1,
    /// Empty (NODATA) response for a valid domain.
    NoData = 2,
    /// NXDOMAIN for any undefined subdomain of a valid domain.
    NXDomain = 3,
    /// Any other DNS error, such as SERVFAIL or FORMERR.
    Error = 4,
}

impl AllowanceCategory {
    /// Number of categories; sizes the per-category statistics array.
    pub const COUNT: usize = 5;

    /// Derives the category from the response's rcode and section counts.
    pub fn classify(rcode: u16, answer_count: usize, ns_count: usize) -> Self {
        match () {
            _ if rcode == 0 && answer_count > 0 => Self::Answer,
            _ if rcode == 0 && ns_count > 0 => Self::Referral,
            _ if rcode == 0 => Self::NoData,
            _ if rcode == 3 => Self::NXDomain,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for AllowanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Answer => "answer",
            Self::Referral => "referral",
            Self::NoData => "nodata",
            Self::NXDomain => "nxdomain",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// The response features that identify a rate-limiting account.
///
/// The caller builds one of these from the response it is about to send.
/// All fields should be populated, with one exception: a response
/// carrying only a COOKIE option (RFC 7873 §5.4) needs only `category`.
///
/// # Salient name selection
///
/// `salient_name` is the name that identifies the response for keying.
/// The rules, evaluated in order:
///
/// 1. For [`NXDomain`](AllowanceCategory::NXDomain) and
///    [`Referral`](AllowanceCategory::Referral) responses: the owner name
///    of the first record in the authority section, or an empty string if
///    that section is empty.
/// 2. For dynamically synthesized answers (wildcards, synthesized reverse
///    records): the origin name the synthesis happened under, prefixed
///    with `*`. This pools the potentially unbounded set of synthesized
///    names under a single account instead of letting an attacker mint a
///    fresh account per query. Determining the origin name is the
///    caller's job; the name is stored verbatim here.
/// 3. Otherwise: the query name from the question section.
///
/// The engine lowercases the name before keying, so mixed-case queries
/// land on the same account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTuple {
    /// Query class, copied from the question record.
    pub class: u16,
    /// Query type, copied from the question record.
    pub rtype: u16,
    /// Allowance category derived from the response.
    pub category: AllowanceCategory,
    /// Name identifying the response; see the selection rules above.
    pub salient_name: String,
}

impl ResponseTuple {
    /// Convenience constructor.
    pub fn new(
        class: u16,
        rtype: u16,
        category: AllowanceCategory,
        salient_name: impl Into<String>,
    ) -> Self {
        Self {
            class,
            rtype,
            category,
            salient_name: salient_name.into(),
        }
    }
}

impl fmt::Display for ResponseTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} sn={}",
            self.class, self.rtype, self.category, self.salient_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let cases = [
            (0, 1, 0, AllowanceCategory::Answer),
            (0, 2, 1, AllowanceCategory::Answer), // ns count ignored
            (0, 0, 1, AllowanceCategory::Referral),
            (0, 0, 2, AllowanceCategory::Referral),
            (0, 0, 0, AllowanceCategory::NoData),
            (3, 0, 0, AllowanceCategory::NXDomain),
            (3, 1, 0, AllowanceCategory::NXDomain),
            (3, 0, 1, AllowanceCategory::NXDomain),
            (3, 1, 1, AllowanceCategory::NXDomain),
            (1, 0, 0, AllowanceCategory::Error),
            (2, 1, 0, AllowanceCategory::Error),
            (4, 0, 1, AllowanceCategory::Error),
            (5, 1, 1, AllowanceCategory::Error),
        ];

        for (ix, (rcode, answers, ns, want)) in cases.iter().enumerate() {
            let got = AllowanceCategory::classify(*rcode, *answers, *ns);
            assert_eq!(got, *want, "case {ix}: {rcode}/{answers}/{ns}");
        }
    }

    #[test]
    fn test_discriminants_are_stable() {
        assert_eq!(u8::from(AllowanceCategory::Answer), 0);
        assert_eq!(u8::from(AllowanceCategory::Referral), 1);
        assert_eq!(u8::from(AllowanceCategory::NoData), 2);
        assert_eq!(u8::from(AllowanceCategory::NXDomain), 3);
        assert_eq!(u8::from(AllowanceCategory::Error), 4);
    }

    #[test]
    fn test_tuple_display() {
        let tuple = ResponseTuple::new(1, 28, AllowanceCategory::Answer, "Example.COM.");
        assert_eq!(tuple.to_string(), "1/28 answer sn=Example.COM.");
    }
}
