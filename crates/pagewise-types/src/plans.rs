use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A subscription tier and the limits that come with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: &'static str,
    pub slug: &'static str,
    /// Maximum number of files a user may keep.
    pub quota: u32,
    /// Maximum number of pages indexed per PDF.
    pub pages_per_pdf: u32,
    /// Monthly price in whole dollars.
    pub price_amount: u32,
}

pub const FREE_PLAN: Plan = Plan {
    name: "Free",
    slug: "free",
    quota: 10,
    pages_per_pdf: 5,
    price_amount: 0,
};

pub const PRO_PLAN: Plan = Plan {
    name: "Pro",
    slug: "pro",
    quota: 50,
    pages_per_pdf: 25,
    price_amount: 15,
};

/// Test-mode price id of the Pro plan, used when no override is configured.
pub const DEFAULT_PRO_PRICE_ID: &str = "price_1Q5PN5L6tUfIIbGGaE1X2nxk";

/// Grace period after `current_period_end`, in hours, during which a
/// subscription still counts as active.
pub const SUBSCRIPTION_GRACE_HOURS: i64 = 24;

/// Whether a recorded subscription is still active at `now`.
pub fn is_subscribed(
    price_id: Option<&str>,
    current_period_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match (price_id, current_period_end) {
        (Some(price), Some(end)) if !price.is_empty() => end + Duration::hours(SUBSCRIPTION_GRACE_HOURS) > now,
        _ => false,
    }
}

/// The plan a user is on, given the price they pay for (if subscribed).
pub fn plan_for(subscribed: bool, price_id: Option<&str>, pro_price_id: &str) -> Plan {
    if subscribed && price_id == Some(pro_price_id) {
        PRO_PLAN
    } else {
        FREE_PLAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_needs_price_and_period_end() {
        let now = Utc::now();
        assert!(!is_subscribed(None, Some(now), now));
        assert!(!is_subscribed(Some("price_x"), None, now));
        assert!(!is_subscribed(Some(""), Some(now), now));
        assert!(is_subscribed(Some("price_x"), Some(now), now));
    }

    #[test]
    fn subscription_lapses_after_grace_period() {
        let now = Utc::now();
        let ended = now - Duration::days(2);
        assert!(!is_subscribed(Some("price_x"), Some(ended), now));

        let just_ended = now - Duration::hours(12);
        assert!(is_subscribed(Some("price_x"), Some(just_ended), now));
    }

    #[test]
    fn unknown_price_falls_back_to_free() {
        assert_eq!(plan_for(true, Some("price_other"), "price_pro"), FREE_PLAN);
        assert_eq!(plan_for(false, Some("price_pro"), "price_pro"), FREE_PLAN);
        assert_eq!(plan_for(true, Some("price_pro"), "price_pro"), PRO_PLAN);
    }
}
