use super::amount::Amount;
use crate::error::{CheckoutError, Result};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A purchasable subscription plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    pub fn get(&self, id: &str) -> Result<&Plan> {
        self.plans
            .iter()
            .find(|plan| plan.id == id)
            .ok_or_else(|| CheckoutError::UnknownPlan(id.to_string()))
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let plan = |id: &str, name: &str, price| Plan {
            id: id.to_string(),
            name: name.to_string(),
            price: Amount::new(price).unwrap_or(Amount::ZERO),
        };
        Self::new(vec![
            plan("cosmo", "VIP Cosmo", dec!(29.90)),
            plan("astral", "VIP Astral", dec!(49.90)),
            plan("legacy", "VIP Legacy", dec!(79.90)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_prices() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.get("cosmo").unwrap().price.to_wire(), "29.90");
        assert_eq!(catalog.get("astral").unwrap().price.to_wire(), "49.90");
        assert_eq!(catalog.get("legacy").unwrap().name, "VIP Legacy");
    }

    #[test]
    fn test_unknown_plan() {
        assert!(matches!(
            PlanCatalog::default().get("gold"),
            Err(CheckoutError::UnknownPlan(_))
        ));
    }
}
