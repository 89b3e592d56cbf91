//! Plan definitions and billing cycles.

use crate::domain::foundation::{PlanRef, ValidationError};
use serde::{Deserialize, Serialize};

/// Billing cadence for a plan subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Nominal entitlement period granted per paid cycle, in days.
    ///
    /// Used for gift durations; live subscriptions take their period
    /// boundaries from the payment authority instead.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Yearly => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(ValidationError::invalid_format(
                "billing_cycle",
                format!("unknown billing cycle '{}'", other),
            )),
        }
    }
}

/// A sellable subscription plan.
///
/// Plans are configuration, not database rows; the catalog is loaded at
/// startup and referenced by `PlanRef`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_ref: PlanRef,
    pub name: String,
    /// Remote price identifier for monthly billing, if offered.
    pub monthly_price_id: Option<String>,
    /// Remote price identifier for yearly billing, if offered.
    pub yearly_price_id: Option<String>,
    /// Charge amounts in minor units, used when pricing gift purchases.
    pub monthly_amount_cents: i64,
    pub yearly_amount_cents: i64,
    pub currency: String,
    /// Number of learner profiles the plan allows.
    pub profiles_allowed: u32,
    /// Whether the plan permits offline lesson downloads.
    pub can_download: bool,
}

impl Plan {
    /// Remote price identifier for the given cycle, if the plan offers it.
    pub fn price_id_for(&self, cycle: BillingCycle) -> Option<&str> {
        match cycle {
            BillingCycle::Monthly => self.monthly_price_id.as_deref(),
            BillingCycle::Yearly => self.yearly_price_id.as_deref(),
        }
    }

    /// Charge amount in minor units for the given cycle.
    pub fn amount_cents_for(&self, cycle: BillingCycle) -> i64 {
        match cycle {
            BillingCycle::Monthly => self.monthly_amount_cents,
            BillingCycle::Yearly => self.yearly_amount_cents,
        }
    }
}

/// Plan fields exposed on subscription views.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub plan_ref: PlanRef,
    pub name: String,
    pub profiles_allowed: u32,
    pub can_download: bool,
}

impl From<&Plan> for PlanSummary {
    fn from(plan: &Plan) -> Self {
        Self {
            plan_ref: plan.plan_ref.clone(),
            name: plan.name.clone(),
            profiles_allowed: plan.profiles_allowed,
            can_download: plan.can_download,
        }
    }
}
