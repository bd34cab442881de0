//! Label selector codec
//!
//! Selectors travel as comma-separated `key=value` pairs, the form the
//! Kubernetes API accepts for server-side list filtering. `,` and `=` are
//! reserved and never escaped.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Label key to value mapping; keys are unique and order carries no meaning
pub type Selector = BTreeMap<String, String>;

/// Serialize a selector as `k1=v1,k2=v2`
pub fn stringify(selector: &Selector) -> Result<String> {
    if selector.is_empty() {
        return Err(Error::EmptySelector);
    }

    Ok(selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(","))
}

/// Parse `k1=v1,k2=v2` into a selector, splitting each pair on its first `=`
pub fn parse(text: &str) -> Result<Selector> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::EmptySelector);
    }

    text.split(',')
        .map(|pair| {
            let pair = pair.trim();
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| Error::MalformedSelector(pair.to_string()))
        })
        .collect()
}

/// Build a selector from string pairs
pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Selector {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// True when every pair of `selector` is present in `labels`
pub fn matches(selector: &Selector, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_joins_pairs() {
        let selector = from_pairs([("app", "reviews"), ("tier", "backend")]);
        assert_eq!(stringify(&selector).unwrap(), "app=reviews,tier=backend");
    }

    #[test]
    fn test_round_trip_is_set_equal() {
        let cases: &[&[(&str, &str)]] = &[
            &[("app", "reviews")],
            &[("version", "2.1.3"), ("app", "x"), ("tier", "backend")],
            &[("app.kubernetes.io/name", "ratings"), ("istio.io/rev", "1-20")],
            &[("team", "données"), ("owner", "山田")],
            &[("canary", ""), ("app", "reviews")],
            &[("flag", "")],
        ];

        for pairs in cases {
            let selector = from_pairs(pairs.iter().copied());
            let text = stringify(&selector).unwrap();
            assert_eq!(parse(&text).unwrap(), selector, "round trip of {:?}", text);
        }
    }

    #[test]
    fn test_empty_selector_rejected_both_ways() {
        assert!(matches!(stringify(&Selector::new()), Err(Error::EmptySelector)));
        assert!(matches!(parse(""), Err(Error::EmptySelector)));
        assert!(matches!(parse("   "), Err(Error::EmptySelector)));
    }

    #[test]
    fn test_pair_without_equals_is_malformed() {
        match parse("a:b") {
            Err(Error::MalformedSelector(pair)) => assert_eq!(pair, "a:b"),
            other => panic!("expected MalformedSelector, got {:?}", other),
        }
        assert!(matches!(
            parse("app=x,broken"),
            Err(Error::MalformedSelector(_))
        ));
    }

    #[test]
    fn test_parse_splits_on_first_equals_only() {
        let selector = parse("query=a=b").unwrap();
        assert_eq!(selector.get("query").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_matches_requires_every_pair() {
        let labels = from_pairs([("app", "x"), ("version", "1")]);
        assert!(matches(&from_pairs([("app", "x")]), &labels));
        assert!(!matches(&from_pairs([("app", "y")]), &labels));
        assert!(!matches(&from_pairs([("zone", "a")]), &labels));
    }
}
