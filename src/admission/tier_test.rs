use super::*;

#[test]
fn parse_known_tiers() {
    assert_eq!(Tier::parse("free"), Some(Tier::Free));
    assert_eq!(Tier::parse("pro"), Some(Tier::Pro));
    assert_eq!(Tier::parse("plus"), Some(Tier::Plus));
    assert_eq!(Tier::parse("enterprise"), Some(Tier::Enterprise));
}

#[test]
fn parse_is_case_and_whitespace_insensitive() {
    assert_eq!(Tier::parse("  PRO "), Some(Tier::Pro));
    assert_eq!(Tier::parse("Enterprise"), Some(Tier::Enterprise));
}

#[test]
fn business_is_plus() {
    assert_eq!(Tier::parse("business"), Some(Tier::Plus));
}

#[test]
fn parse_unknown_is_none() {
    assert_eq!(Tier::parse("platinum"), None);
    assert_eq!(Tier::parse(""), None);
}

#[test]
fn resolve_unknown_falls_back_to_free() {
    assert_eq!(Tier::resolve("platinum"), Tier::Free);
    assert_eq!(Tier::resolve("plus"), Tier::Plus);
}

#[test]
fn as_str_round_trips_through_parse() {
    for tier in Tier::ALL {
        assert_eq!(Tier::parse(tier.as_str()), Some(tier));
    }
}

#[test]
fn default_table_matches_pricing() {
    let table = TierLimitTable::defaults();
    assert_eq!(table.limits(Tier::Free), TierLimits::new(10, 2));
    assert_eq!(table.limits(Tier::Pro), TierLimits::new(100, 10));
    assert_eq!(table.limits(Tier::Plus), TierLimits::new(500, 25));
    assert_eq!(table.limits(Tier::Enterprise), TierLimits::new(10_000, 50));
}

#[test]
fn limits_increase_with_tier() {
    let table = TierLimitTable::defaults();
    for pair in Tier::ALL.windows(2) {
        let lower = table.limits(pair[0]);
        let higher = table.limits(pair[1]);
        assert!(higher.requests_per_window > lower.requests_per_window);
        assert!(higher.max_concurrent > lower.max_concurrent);
    }
}

#[test]
fn with_replaces_single_tier() {
    let table = TierLimitTable::defaults().with(Tier::Pro, TierLimits::new(3, 1));
    assert_eq!(table.limits(Tier::Pro), TierLimits::new(3, 1));
    assert_eq!(table.limits(Tier::Free), TierLimits::new(10, 2));
}

#[test]
fn tier_serializes_lowercase() {
    assert_eq!(serde_json::to_value(Tier::Enterprise).unwrap(), "enterprise");
}
