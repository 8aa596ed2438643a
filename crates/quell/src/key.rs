//! Account key construction.
//!
//! Keys are `/`-joined so that responses indicative of abuse collapse to
//! few accounts. The per-category projections follow the classic BIND
//! RRL collapse: empty (NODATA) and NXDOMAIN responses are identical
//! regardless of query type, and error responses are identical regardless
//! of both name and type. Dropped fields are rendered as empty segments
//! so equal inputs always produce byte-identical keys.

use crate::classify::AllowanceCategory;

/// Builds the response-tuple account key.
///
/// `name` must already be lowercased by the caller.
pub(crate) fn account_key(
    ip_prefix: &str,
    qtype: u16,
    name: &str,
    category: AllowanceCategory,
) -> String {
    let cat = u8::from(category);
    match category {
        AllowanceCategory::Answer | AllowanceCategory::Referral => {
            format!("{ip_prefix}/{cat}/{qtype}/{name}")
        }
        AllowanceCategory::NoData | AllowanceCategory::NXDomain => {
            format!("{ip_prefix}/{cat}//{name}")
        }
        AllowanceCategory::Error => format!("{ip_prefix}/{cat}//"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projections() {
        let cases = [
            (AllowanceCategory::Answer, "10.0.0.0/0/28/example.com."),
            (AllowanceCategory::Referral, "10.0.0.0/1/28/example.com."),
            (AllowanceCategory::NoData, "10.0.0.0/2//example.com."),
            (AllowanceCategory::NXDomain, "10.0.0.0/3//example.com."),
            (AllowanceCategory::Error, "10.0.0.0/4//"),
        ];

        for (category, want) in cases {
            assert_eq!(account_key("10.0.0.0", 28, "example.com.", category), want);
        }
    }

    #[test]
    fn test_empty_fields_keep_segments() {
        // Unparseable sources mask to "" and absent names stay empty;
        // both still produce well-formed pooled keys.
        assert_eq!(account_key("", 1, "", AllowanceCategory::NXDomain), "/3//");
        assert_eq!(account_key("", 0, "", AllowanceCategory::Error), "/4//");
    }

    #[test]
    fn test_keys_are_deterministic() {
        let a = account_key("192.0.2.0", 1, "a.example.", AllowanceCategory::Answer);
        let b = account_key("192.0.2.0", 1, "a.example.", AllowanceCategory::Answer);
        assert_eq!(a, b);
    }
}
