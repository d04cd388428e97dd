//! Stage 2: rule-based mapping from product categories to GL accounts.
//!
//! No AI and no I/O - a static table over the closed category vocabulary.
//! Granular COGS sub-accounts (5001-5209) roll up to their parents for
//! GIFI/T2125 reporting. Equipment splits on the capitalization threshold:
//! at or above it the line is a fixed asset (1500) and must be reviewed,
//! below it an expense (6300).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product categories recognized by Stage 1. The identifiers are stable:
/// the account table below and the cache both key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    FoodHotdog,
    FoodSandwich,
    FoodPizza,
    FoodFrozen,
    FoodBakery,
    FoodDairy,
    FoodMeat,
    FoodProduce,
    FoodCondiment,
    FoodPantry,
    FoodOther,
    FoodOil,
    BeverageSoda,
    BeverageWater,
    BeverageEnergy,
    BeverageSports,
    BeverageJuice,
    BeverageCoffee,
    BeverageTea,
    BeverageMilk,
    BeverageAlcohol,
    BeverageOther,
    SupplementProtein,
    SupplementVitamin,
    SupplementPreworkout,
    SupplementRecovery,
    SupplementSportsNutrition,
    SupplementOther,
    RetailSnack,
    RetailCandy,
    RetailHealth,
    RetailAccessory,
    RetailApparel,
    RetailOther,
    Freight,
    PackagingContainer,
    PackagingBag,
    PackagingUtensil,
    SupplyCleaning,
    SupplyPaper,
    SupplyKitchen,
    SupplyOther,
    OfficeSupply,
    RepairEquipment,
    RepairBuilding,
    Maintenance,
    Equipment,
    Deposit,
    License,
    Unknown,
}

impl ProductCategory {
    /// Every category, in prompt/display order.
    pub const ALL: &'static [Self] = &[
        Self::FoodHotdog,
        Self::FoodSandwich,
        Self::FoodPizza,
        Self::FoodFrozen,
        Self::FoodBakery,
        Self::FoodDairy,
        Self::FoodMeat,
        Self::FoodProduce,
        Self::FoodCondiment,
        Self::FoodPantry,
        Self::FoodOther,
        Self::FoodOil,
        Self::BeverageSoda,
        Self::BeverageWater,
        Self::BeverageEnergy,
        Self::BeverageSports,
        Self::BeverageJuice,
        Self::BeverageCoffee,
        Self::BeverageTea,
        Self::BeverageMilk,
        Self::BeverageAlcohol,
        Self::BeverageOther,
        Self::SupplementProtein,
        Self::SupplementVitamin,
        Self::SupplementPreworkout,
        Self::SupplementRecovery,
        Self::SupplementSportsNutrition,
        Self::SupplementOther,
        Self::RetailSnack,
        Self::RetailCandy,
        Self::RetailHealth,
        Self::RetailAccessory,
        Self::RetailApparel,
        Self::RetailOther,
        Self::Freight,
        Self::PackagingContainer,
        Self::PackagingBag,
        Self::PackagingUtensil,
        Self::SupplyCleaning,
        Self::SupplyPaper,
        Self::SupplyKitchen,
        Self::SupplyOther,
        Self::OfficeSupply,
        Self::RepairEquipment,
        Self::RepairBuilding,
        Self::Maintenance,
        Self::Equipment,
        Self::Deposit,
        Self::License,
        Self::Unknown,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FoodHotdog => "food_hotdog",
            Self::FoodSandwich => "food_sandwich",
            Self::FoodPizza => "food_pizza",
            Self::FoodFrozen => "food_frozen",
            Self::FoodBakery => "food_bakery",
            Self::FoodDairy => "food_dairy",
            Self::FoodMeat => "food_meat",
            Self::FoodProduce => "food_produce",
            Self::FoodCondiment => "food_condiment",
            Self::FoodPantry => "food_pantry",
            Self::FoodOther => "food_other",
            Self::FoodOil => "food_oil",
            Self::BeverageSoda => "beverage_soda",
            Self::BeverageWater => "beverage_water",
            Self::BeverageEnergy => "beverage_energy",
            Self::BeverageSports => "beverage_sports",
            Self::BeverageJuice => "beverage_juice",
            Self::BeverageCoffee => "beverage_coffee",
            Self::BeverageTea => "beverage_tea",
            Self::BeverageMilk => "beverage_milk",
            Self::BeverageAlcohol => "beverage_alcohol",
            Self::BeverageOther => "beverage_other",
            Self::SupplementProtein => "supplement_protein",
            Self::SupplementVitamin => "supplement_vitamin",
            Self::SupplementPreworkout => "supplement_preworkout",
            Self::SupplementRecovery => "supplement_recovery",
            Self::SupplementSportsNutrition => "supplement_sports_nutrition",
            Self::SupplementOther => "supplement_other",
            Self::RetailSnack => "retail_snack",
            Self::RetailCandy => "retail_candy",
            Self::RetailHealth => "retail_health",
            Self::RetailAccessory => "retail_accessory",
            Self::RetailApparel => "retail_apparel",
            Self::RetailOther => "retail_other",
            Self::Freight => "freight",
            Self::PackagingContainer => "packaging_container",
            Self::PackagingBag => "packaging_bag",
            Self::PackagingUtensil => "packaging_utensil",
            Self::SupplyCleaning => "supply_cleaning",
            Self::SupplyPaper => "supply_paper",
            Self::SupplyKitchen => "supply_kitchen",
            Self::SupplyOther => "supply_other",
            Self::OfficeSupply => "office_supply",
            Self::RepairEquipment => "repair_equipment",
            Self::RepairBuilding => "repair_building",
            Self::Maintenance => "maintenance",
            Self::Equipment => "equipment",
            Self::Deposit => "deposit",
            Self::License => "license",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a category identifier; anything unrecognized is `None` (the
    /// recognizer degrades it to [`Self::Unknown`]).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == value)
    }

    /// One-line gloss used in the recognition prompt.
    #[must_use]
    pub fn gloss(self) -> &'static str {
        match self {
            Self::FoodHotdog => "Hot dogs, sausages, wieners",
            Self::FoodSandwich => "Sandwiches, wraps, subs",
            Self::FoodPizza => "Pizza products",
            Self::FoodFrozen => "Frozen foods, ice cream",
            Self::FoodBakery => "Bread, buns, pastries",
            Self::FoodDairy => "Cheese, yogurt, butter (not milk drinks)",
            Self::FoodMeat => "Meat, deli products",
            Self::FoodProduce => "Fruits, vegetables",
            Self::FoodCondiment => "Ketchup, mustard, mayo, sauces",
            Self::FoodPantry => "Canned goods, pasta, rice, spices",
            Self::FoodOther => "Other food items",
            Self::FoodOil => "Cooking oils, fats, shortening",
            Self::BeverageSoda => "Soft drinks, cola, citrus sodas",
            Self::BeverageWater => "Bottled water, sparkling water",
            Self::BeverageEnergy => "Energy drinks (Red Bull, Monster, etc.)",
            Self::BeverageSports => "Sports drinks (Gatorade, Powerade, etc.)",
            Self::BeverageJuice => "Juice, juice boxes",
            Self::BeverageCoffee => "Coffee products (RTD coffee, cold brew)",
            Self::BeverageTea => "Tea products (iced tea, bottled tea)",
            Self::BeverageMilk => "Milk-based drinks (chocolate milk, etc.)",
            Self::BeverageAlcohol => "Beer, wine, liquor",
            Self::BeverageOther => "Other beverages",
            Self::SupplementProtein => "Protein powder, protein bars",
            Self::SupplementVitamin => "Vitamins, minerals",
            Self::SupplementPreworkout => "Pre-workout supplements",
            Self::SupplementRecovery => "Recovery supplements",
            Self::SupplementSportsNutrition => "Sports nutrition products",
            Self::SupplementOther => "Other supplements",
            Self::RetailSnack => "Chips, pretzels, popcorn",
            Self::RetailCandy => "Candy, chocolate bars",
            Self::RetailHealth => "Health products",
            Self::RetailAccessory => "Gym accessories, shaker bottles",
            Self::RetailApparel => "Clothing, merchandise",
            Self::RetailOther => "Other retail goods",
            Self::Freight => "Delivery charges, shipping fees",
            Self::PackagingContainer => "To-go containers, cups",
            Self::PackagingBag => "Bags, wrapping",
            Self::PackagingUtensil => "Utensils, straws",
            Self::SupplyCleaning => "Cleaning products",
            Self::SupplyPaper => "Paper towels, napkins",
            Self::SupplyKitchen => "Kitchen supplies",
            Self::SupplyOther => "Other supplies",
            Self::OfficeSupply => "Office supplies",
            Self::RepairEquipment => "Equipment repairs",
            Self::RepairBuilding => "Building repairs",
            Self::Maintenance => "Maintenance items",
            Self::Equipment => "Equipment purchases",
            Self::Deposit => "Bottle/can/keg deposits",
            Self::License => "Licenses, permits",
            Self::Unknown => "Cannot determine (use only as last resort)",
        }
    }
}

/// Result of Stage 2 mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountMapping {
    pub account_code: &'static str,
    pub account_name: &'static str,
    /// Always 1.0; the mapper is deterministic.
    pub confidence: f64,
    /// Forced true on the capitalization path and for `unknown`.
    pub requires_review: bool,
    pub mapping_rule: String,
}

/// Maps product categories to GL accounts.
pub struct AccountMapper {
    capitalization_threshold: Decimal,
}

impl AccountMapper {
    #[must_use]
    pub const fn new(capitalization_threshold: Decimal) -> Self {
        Self {
            capitalization_threshold,
        }
    }

    /// Maps a category (plus the line total, for the equipment split) to a
    /// GL account.
    #[must_use]
    pub fn map(&self, category: ProductCategory, line_total: Decimal) -> AccountMapping {
        let mut requires_review = false;

        let account_code = match category {
            ProductCategory::FoodHotdog => "5001",
            ProductCategory::FoodSandwich => "5002",
            ProductCategory::FoodPizza => "5003",
            ProductCategory::FoodFrozen => "5004",
            ProductCategory::FoodBakery => "5005",
            ProductCategory::FoodDairy => "5006",
            ProductCategory::FoodMeat => "5007",
            ProductCategory::FoodProduce => "5008",
            ProductCategory::FoodOil => "5009",
            ProductCategory::FoodCondiment
            | ProductCategory::FoodPantry
            | ProductCategory::FoodOther => "5099",
            ProductCategory::BeverageSoda => "5011",
            ProductCategory::BeverageWater => "5012",
            ProductCategory::BeverageEnergy => "5013",
            ProductCategory::BeverageSports => "5014",
            ProductCategory::BeverageJuice => "5015",
            ProductCategory::BeverageCoffee | ProductCategory::BeverageTea => "5016",
            ProductCategory::BeverageMilk => "5017",
            ProductCategory::BeverageAlcohol => "5018",
            ProductCategory::BeverageOther => "5019",
            ProductCategory::SupplementProtein => "5021",
            ProductCategory::SupplementVitamin => "5022",
            ProductCategory::SupplementPreworkout => "5023",
            ProductCategory::SupplementRecovery => "5024",
            ProductCategory::SupplementSportsNutrition => "5025",
            ProductCategory::SupplementOther => "5029",
            ProductCategory::RetailSnack => "5031",
            ProductCategory::RetailCandy => "5032",
            ProductCategory::RetailHealth => "5033",
            ProductCategory::RetailAccessory => "5034",
            ProductCategory::RetailApparel => "5035",
            ProductCategory::RetailOther => "5039",
            ProductCategory::Freight => "5100",
            ProductCategory::PackagingContainer => "5201",
            ProductCategory::PackagingBag => "5202",
            ProductCategory::PackagingUtensil => "5203",
            ProductCategory::SupplyCleaning => "5204",
            ProductCategory::SupplyPaper => "5205",
            ProductCategory::SupplyKitchen => "5206",
            ProductCategory::SupplyOther => "5209",
            ProductCategory::OfficeSupply => "6600",
            ProductCategory::RepairEquipment
            | ProductCategory::RepairBuilding
            | ProductCategory::Maintenance => "6300",
            ProductCategory::Equipment => {
                if line_total.abs() >= self.capitalization_threshold {
                    // Capitalize as a fixed asset; always reviewed
                    requires_review = true;
                    "1500"
                } else {
                    "6300"
                }
            }
            ProductCategory::Deposit => "9000",
            ProductCategory::License => "6800",
            ProductCategory::Unknown => {
                requires_review = true;
                "9100"
            }
        };

        AccountMapping {
            account_code,
            account_name: account_name(account_code).unwrap_or("Unknown Account"),
            confidence: 1.0,
            requires_review,
            mapping_rule: format!("{} -> {}", category.as_str(), account_code),
        }
    }
}

/// Human-readable account name for a GL code.
#[must_use]
pub fn account_name(code: &str) -> Option<&'static str> {
    Some(match code {
        "5001" => "COGS - Food - Hot Dogs",
        "5002" => "COGS - Food - Sandwiches",
        "5003" => "COGS - Food - Pizza",
        "5004" => "COGS - Food - Frozen",
        "5005" => "COGS - Food - Bakery",
        "5006" => "COGS - Food - Dairy",
        "5007" => "COGS - Food - Meat/Deli",
        "5008" => "COGS - Food - Produce",
        "5009" => "COGS - Food - Cooking Oil/Fats",
        "5099" => "COGS - Food - Other",
        "5011" => "COGS - Beverage - Soda",
        "5012" => "COGS - Beverage - Water",
        "5013" => "COGS - Beverage - Energy Drinks",
        "5014" => "COGS - Beverage - Sports Drinks",
        "5015" => "COGS - Beverage - Juice",
        "5016" => "COGS - Beverage - Coffee/Tea",
        "5017" => "COGS - Beverage - Milk Products",
        "5018" => "COGS - Beverage - Alcohol",
        "5019" => "COGS - Beverage - Other",
        "5021" => "COGS - Supplements - Protein",
        "5022" => "COGS - Supplements - Vitamins",
        "5023" => "COGS - Supplements - Pre-Workout",
        "5024" => "COGS - Supplements - Recovery",
        "5025" => "COGS - Supplements - Sports Nutrition",
        "5029" => "COGS - Supplements - Other",
        "5031" => "COGS - Retail - Snacks/Chips",
        "5032" => "COGS - Retail - Candy/Chocolate",
        "5033" => "COGS - Retail - Health Products",
        "5034" => "COGS - Retail - Accessories",
        "5035" => "COGS - Retail - Apparel",
        "5039" => "COGS - Retail - Other",
        "5100" => "Freight In",
        "5201" => "Packaging - Containers/Cups",
        "5202" => "Packaging - Bags/Wrapping",
        "5203" => "Packaging - Utensils/Straws",
        "5204" => "Supplies - Cleaning",
        "5205" => "Supplies - Paper Products",
        "5206" => "Supplies - Kitchen",
        "5209" => "Supplies - Other",
        "6300" => "Repairs & Maintenance",
        "6600" => "Office Supplies",
        "6800" => "Licenses & Permits",
        "9000" => "Deposits - Bottle/Container",
        "9100" => "Pending Receipt - No ITC",
        "1500" => "Fixed Asset - Equipment",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mapper() -> AccountMapper {
        AccountMapper::new(dec!(2500.00))
    }

    #[test]
    fn category_identifiers_round_trip() {
        for category in ProductCategory::ALL {
            assert_eq!(ProductCategory::parse(category.as_str()), Some(*category));
        }
        assert_eq!(ProductCategory::parse("beverage_sodas"), None);
    }

    #[test]
    fn representative_rows_match_the_chart_of_accounts() {
        let mapper = mapper();
        assert_eq!(
            mapper.map(ProductCategory::BeverageSoda, dec!(10)).account_code,
            "5011"
        );
        assert_eq!(
            mapper.map(ProductCategory::RetailSnack, dec!(14.99)).account_code,
            "5031"
        );
        assert_eq!(
            mapper.map(ProductCategory::Freight, dec!(18.50)).account_code,
            "5100"
        );
        assert_eq!(
            mapper.map(ProductCategory::Deposit, dec!(0.10)).account_code,
            "9000"
        );
        assert_eq!(
            mapper.map(ProductCategory::BeverageTea, dec!(3.00)).account_code,
            "5016"
        );
    }

    #[test]
    fn equipment_capitalizes_at_threshold() {
        let mapper = mapper();

        let expensed = mapper.map(ProductCategory::Equipment, dec!(499.99));
        assert_eq!(expensed.account_code, "6300");
        assert!(!expensed.requires_review);

        let capitalized = mapper.map(ProductCategory::Equipment, dec!(3499.99));
        assert_eq!(capitalized.account_code, "1500");
        assert!(capitalized.requires_review);
        assert_eq!(capitalized.account_name, "Fixed Asset - Equipment");

        // Exactly at the threshold capitalizes too
        assert_eq!(
            mapper.map(ProductCategory::Equipment, dec!(2500.00)).account_code,
            "1500"
        );
    }

    #[test]
    fn unknown_maps_to_pending_and_requires_review() {
        let mapping = mapper().map(ProductCategory::Unknown, dec!(5.00));
        assert_eq!(mapping.account_code, "9100");
        assert!(mapping.requires_review);
        assert_eq!(mapping.confidence, 1.0);
    }
}
