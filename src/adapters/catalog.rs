//! Static plan catalog loaded from configuration.

use std::collections::HashMap;

use crate::domain::entitlement::Plan;
use crate::domain::foundation::PlanRef;
use crate::ports::PlanCatalog;

/// Catalog holding the plans configured at startup.
pub struct StaticPlanCatalog {
    plans: HashMap<PlanRef, Plan>,
}

impl StaticPlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self {
            plans: plans
                .into_iter()
                .map(|plan| (plan.plan_ref.clone(), plan))
                .collect(),
        }
    }
}

impl PlanCatalog for StaticPlanCatalog {
    fn find(&self, plan_ref: &PlanRef) -> Option<&Plan> {
        self.plans.get(plan_ref)
    }

    fn all(&self) -> Vec<&Plan> {
        let mut all: Vec<&Plan> = self.plans.values().collect();
        all.sort_by(|a, b| a.plan_ref.as_str().cmp(b.plan_ref.as_str()));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(slug: &str) -> Plan {
        Plan {
            plan_ref: PlanRef::try_from(slug).unwrap(),
            name: slug.to_string(),
            monthly_price_id: Some(format!("price_{}_m", slug)),
            yearly_price_id: Some(format!("price_{}_y", slug)),
            monthly_amount_cents: 999,
            yearly_amount_cents: 9990,
            currency: "usd".to_string(),
            profiles_allowed: 1,
            can_download: false,
        }
    }

    #[test]
    fn find_returns_configured_plan() {
        let catalog = StaticPlanCatalog::new(vec![plan("basic"), plan("premium")]);
        assert!(catalog.find(&PlanRef::try_from("basic").unwrap()).is_some());
        assert!(catalog.find(&PlanRef::try_from("missing").unwrap()).is_none());
    }

    #[test]
    fn all_is_sorted_by_plan_ref() {
        let catalog = StaticPlanCatalog::new(vec![plan("premium"), plan("basic")]);
        let refs: Vec<&str> = catalog.all().iter().map(|p| p.plan_ref.as_str()).collect();
        assert_eq!(refs, vec!["basic", "premium"]);
    }
}
