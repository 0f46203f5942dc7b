use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Purchasable plans. Prices are whole VND (no minor units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanCode {
    ProMonthly,
    ProYearly,
    // snake_case does not insert an underscore before digits, so these two
    // need explicit names to match the `credits_50` / `credits_100` wire form.
    #[serde(rename = "credits_50")]
    #[strum(serialize = "credits_50")]
    Credits50,
    #[serde(rename = "credits_100")]
    #[strum(serialize = "credits_100")]
    Credits100,
}

impl PlanCode {
    pub const ALL: [PlanCode; 4] = [
        Self::ProMonthly,
        Self::ProYearly,
        Self::Credits50,
        Self::Credits100,
    ];

    /// Price in whole VND.
    pub fn price_vnd(&self) -> i64 {
        match self {
            Self::ProMonthly => 99_000,
            Self::ProYearly => 990_000,
            Self::Credits50 => 49_000,
            Self::Credits100 => 89_000,
        }
    }

    /// Credits granted on payment, for credit packs. None for subscriptions.
    pub fn credits(&self) -> Option<i64> {
        match self {
            Self::Credits50 => Some(50),
            Self::Credits100 => Some(100),
            _ => None,
        }
    }

    /// Billing period in days, for subscription plans. None for credit packs.
    pub fn billing_period_days(&self) -> Option<i64> {
        match self {
            Self::ProMonthly => Some(30),
            Self::ProYearly => Some(365),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ProMonthly => "Pro (monthly)",
            Self::ProYearly => "Pro (yearly)",
            Self::Credits50 => "50 credits",
            Self::Credits100 => "100 credits",
        }
    }
}

/// One entry of the public pricing catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct PricingEntry {
    pub plan: PlanCode,
    pub name: &'static str,
    pub amount: i64,
    pub currency: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_period_days: Option<i64>,
}

/// The full pricing catalogue, in display order.
pub fn pricing_catalogue() -> Vec<PricingEntry> {
    PlanCode::ALL
        .iter()
        .map(|plan| PricingEntry {
            plan: *plan,
            name: plan.display_name(),
            amount: plan.price_vnd(),
            currency: "VND",
            credits: plan.credits(),
            billing_period_days: plan.billing_period_days(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_round_trip() {
        for plan in PlanCode::ALL {
            let s = plan.as_ref().to_string();
            let parsed: PlanCode = s.parse().unwrap();
            assert_eq!(parsed, plan);
        }
        assert!("pro_weekly".parse::<PlanCode>().is_err());
    }

    #[test]
    fn test_credit_packs_have_no_billing_period() {
        assert_eq!(PlanCode::Credits50.credits(), Some(50));
        assert_eq!(PlanCode::Credits50.billing_period_days(), None);
        assert_eq!(PlanCode::ProYearly.billing_period_days(), Some(365));
        assert_eq!(PlanCode::ProYearly.credits(), None);
    }
}
