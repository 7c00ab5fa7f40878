use std::str::FromStr;

use clap::Args;
use rust_decimal::Decimal;
use tradeflow_core::config::{AppConfig, LoadOptions};
use tradeflow_core::domain::customer::CustomerType;
use tradeflow_core::pricing::tiers::VolumeTier;
use tradeflow_core::pricing::{
    DemandLevel, DeterministicPricingEngine, PricingEngine, PricingMethod, PricingRequest,
};

use crate::commands::CommandResult;

#[derive(Debug, Clone, Args)]
pub struct PriceArgs {
    #[arg(long, help = "Item cost price in the base currency")]
    pub cost: Decimal,
    #[arg(
        long,
        default_value = "cost_plus",
        help = "cost_plus|margin_based|competitive|volume_tiered|dynamic|contract"
    )]
    pub method: PricingMethod,
    #[arg(long, default_value = "retail", help = "retail|wholesale (selects the default markup)")]
    pub customer_type: CustomerType,
    #[arg(long, default_value = "1")]
    pub quantity: Decimal,
    #[arg(long, help = "Markup percent for cost-plus pricing")]
    pub markup: Option<Decimal>,
    #[arg(long, help = "Target margin percent for margin-based pricing")]
    pub margin: Option<Decimal>,
    #[arg(long = "competitor", help = "Competitor unit price; repeat for several")]
    pub competitor_prices: Vec<Decimal>,
    #[arg(
        long = "tier",
        value_parser = parse_tier,
        help = "Volume tier as MIN:MAX:DISCOUNT[:SPECIAL]; leave MAX empty for open-ended"
    )]
    pub tiers: Vec<VolumeTier>,
    #[arg(long, default_value = "normal", help = "low|normal|high")]
    pub demand: DemandLevel,
    #[arg(long)]
    pub contract_price: Option<Decimal>,
    #[arg(long)]
    pub min_price: Option<Decimal>,
    #[arg(long)]
    pub max_price: Option<Decimal>,
    #[arg(long, help = "Quote currency; defaults to the configured base currency")]
    pub currency: Option<String>,
}

impl PriceArgs {
    pub fn to_request(&self) -> PricingRequest {
        PricingRequest {
            customer_type: self.customer_type,
            quantity: self.quantity,
            markup_pct: self.markup,
            target_margin_pct: self.margin,
            competitor_prices: self.competitor_prices.clone(),
            volume_tiers: self.tiers.clone(),
            demand: self.demand,
            contract_price: self.contract_price,
            min_price: self.min_price,
            max_price: self.max_price,
            currency: self.currency.clone(),
            ..PricingRequest::new(self.cost, self.method)
        }
    }
}

pub fn run(args: &PriceArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "price",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let engine = DeterministicPricingEngine::new(config.pricing);
    match engine.price(&args.to_request()) {
        Ok(breakdown) => CommandResult::document("price", &breakdown),
        Err(error) => CommandResult::failure("price", "pricing", error.to_string(), 3),
    }
}

/// Parses `MIN:MAX:DISCOUNT[:SPECIAL]`, e.g. `100::15` or `10:49:5:18.50`.
pub fn parse_tier(raw: &str) -> Result<VolumeTier, String> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    if !(3..=4).contains(&parts.len()) {
        return Err(format!("expected MIN:MAX:DISCOUNT[:SPECIAL], got `{raw}`"));
    }

    let decimal = |label: &str, value: &str| {
        Decimal::from_str(value).map_err(|error| format!("invalid {label} `{value}`: {error}"))
    };
    let optional = |label: &str, value: Option<&&str>| match value {
        Some(value) if !value.is_empty() => decimal(label, *value).map(Some),
        _ => Ok(None),
    };

    Ok(VolumeTier {
        min_qty: decimal("min", parts[0])?,
        max_qty: optional("max", parts.get(1))?,
        discount_pct: optional("discount", parts.get(2))?.unwrap_or(Decimal::ZERO),
        special_price: optional("special price", parts.get(3))?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::parse_tier;

    #[test]
    fn parses_open_ended_tier() {
        let tier = parse_tier("100::15").expect("tier");

        assert_eq!(tier.min_qty, Decimal::new(100, 0));
        assert_eq!(tier.max_qty, None);
        assert_eq!(tier.discount_pct, Decimal::new(15, 0));
        assert_eq!(tier.special_price, None);
    }

    #[test]
    fn parses_tier_with_special_price() {
        let tier = parse_tier("10:49:0:18.50").expect("tier");

        assert_eq!(tier.max_qty, Some(Decimal::new(49, 0)));
        assert_eq!(tier.special_price, Some(Decimal::new(1850, 2)));
    }

    #[test]
    fn rejects_malformed_tiers() {
        assert!(parse_tier("10").is_err());
        assert!(parse_tier("ten:20:5").is_err());
        assert!(parse_tier("1:2:3:4:5").is_err());
    }
}
