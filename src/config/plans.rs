//! Plan catalog configuration
//!
//! The sellable plans are configured as a JSON array in a single
//! environment variable, keeping the catalog deployable without a code
//! change while the domain still validates every entry at startup.

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::entitlement::Plan;
use crate::domain::foundation::PlanRef;

/// Plan catalog configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlansConfig {
    /// JSON array describing the sellable plans
    pub catalog: String,
}

/// One configured plan entry, as written in the catalog JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanEntry {
    pub plan_ref: String,
    pub name: String,
    #[serde(default)]
    pub monthly_price_id: Option<String>,
    #[serde(default)]
    pub yearly_price_id: Option<String>,
    #[serde(default)]
    pub monthly_amount_cents: i64,
    #[serde(default)]
    pub yearly_amount_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_profiles")]
    pub profiles_allowed: u32,
    #[serde(default)]
    pub can_download: bool,
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_profiles() -> u32 {
    1
}

impl PlansConfig {
    /// Parses the catalog JSON into validated domain plans.
    pub fn to_plans(&self) -> Result<Vec<Plan>, ValidationError> {
        let entries: Vec<PlanEntry> = serde_json::from_str(&self.catalog)
            .map_err(|e| ValidationError::InvalidPlanCatalog(e.to_string()))?;

        entries.into_iter().map(plan_from_entry).collect()
    }

    /// Validate the plan catalog
    pub fn validate(&self) -> Result<(), ValidationError> {
        let plans = self.to_plans()?;
        if plans.is_empty() {
            return Err(ValidationError::EmptyPlanCatalog);
        }
        for plan in &plans {
            if plan.monthly_price_id.is_none() && plan.yearly_price_id.is_none() {
                return Err(ValidationError::InvalidPlanCatalog(format!(
                    "plan '{}' has no price on any billing cycle",
                    plan.plan_ref
                )));
            }
        }
        Ok(())
    }
}

fn plan_from_entry(entry: PlanEntry) -> Result<Plan, ValidationError> {
    let plan_ref = PlanRef::new(entry.plan_ref)
        .map_err(|e| ValidationError::InvalidPlanCatalog(e.to_string()))?;

    Ok(Plan {
        plan_ref,
        name: entry.name,
        monthly_price_id: entry.monthly_price_id,
        yearly_price_id: entry.yearly_price_id,
        monthly_amount_cents: entry.monthly_amount_cents,
        yearly_amount_cents: entry.yearly_amount_cents,
        currency: entry.currency,
        profiles_allowed: entry.profiles_allowed,
        can_download: entry.can_download,
    })
}
