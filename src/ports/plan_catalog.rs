//! Port for the plan catalog.

use crate::domain::entitlement::Plan;
use crate::domain::foundation::PlanRef;

/// Lookup of sellable plans.
///
/// Synchronous: the catalog is configuration loaded at startup, not a
/// remote resource.
pub trait PlanCatalog: Send + Sync {
    fn find(&self, plan_ref: &PlanRef) -> Option<&Plan>;

    fn all(&self) -> Vec<&Plan>;
}
