use super::ids::TierId;
use super::money::Money;
use serde::{Deserialize, Serialize};

/// One year, the agreed membership validity.
pub const DEFAULT_DURATION_DAYS: u32 = 365;

/// A membership plan: annual price and maximum layaway (item) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipTier {
    pub id: TierId,
    pub name: String,
    pub price: Money,
    pub max_purchase_value: Money,
    pub duration_days: u32,
    pub description: String,
    pub is_available: bool,
    #[serde(default)]
    pub version: u64,
}

impl MembershipTier {
    pub fn new(name: impl Into<String>, price: Money, max_purchase_value: Money) -> Self {
        Self {
            id: TierId::new(),
            name: name.into(),
            price,
            max_purchase_value,
            duration_days: DEFAULT_DURATION_DAYS,
            description: String::new(),
            is_available: true,
            version: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The default offer installed by the operator tool when no tiers exist.
pub fn default_tiers() -> Vec<MembershipTier> {
    vec![
        MembershipTier::new("Basic", Money::new(10_000), Money::new(30_000)).with_description(
            "Basic membership. Annual fee. Access to layaway and savings. Max layaway 30,000.",
        ),
        MembershipTier::new("Premium", Money::new(20_000), Money::new(50_000))
            .with_description("Premium membership. Annual fee. Enhanced benefits. Max layaway 50,000."),
    ]
}
