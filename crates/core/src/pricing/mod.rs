//! Multi-method unit pricing.
//!
//! Every method produces a raw unit price from the item cost; the engine then
//! applies the optional floor/ceiling, rounds to cents, converts into the
//! requested currency and derives margin, markup and market position. Each
//! stage is recorded in the breakdown's trace.

pub mod currency;
pub mod tiers;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PricingConfig;
use crate::domain::customer::{Customer, CustomerType};
use crate::domain::item::Item;
use crate::domain::quotation::QuotationItem;

use self::currency::CurrencyConverter;
use self::tiers::{resolve_tier, validate_tiers, VolumeTier};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Target margin cannot be 100% or higher")]
    MarginTooHigh,
    #[error("Competitor prices are required for competitive pricing")]
    MissingCompetitorPrices,
    #[error("Contract price is required for contract pricing")]
    MissingContractPrice,
    #[error("Minimum price {min} exceeds maximum price {max}")]
    InvalidClampRange { min: Decimal, max: Decimal },
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMethod {
    #[default]
    CostPlus,
    MarginBased,
    Competitive,
    VolumeTiered,
    Dynamic,
    Contract,
}

impl PricingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CostPlus => "cost_plus",
            Self::MarginBased => "margin_based",
            Self::Competitive => "competitive",
            Self::VolumeTiered => "volume_tiered",
            Self::Dynamic => "dynamic",
            Self::Contract => "contract",
        }
    }
}

impl std::str::FromStr for PricingMethod {
    type Err = PricingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cost_plus" => Ok(Self::CostPlus),
            "margin_based" | "margin" => Ok(Self::MarginBased),
            "competitive" => Ok(Self::Competitive),
            "volume_tiered" | "volume" => Ok(Self::VolumeTiered),
            "dynamic" => Ok(Self::Dynamic),
            "contract" => Ok(Self::Contract),
            other => Err(PricingError::InvalidInput(format!("unknown pricing method `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandLevel {
    Low,
    #[default]
    Normal,
    High,
}

impl std::str::FromStr for DemandLevel {
    type Err = PricingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(PricingError::InvalidInput(format!("unknown demand level `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitivePosition {
    Above,
    At,
    Below,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceClamp {
    Minimum,
    Maximum,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRequest {
    pub cost_price: Decimal,
    #[serde(default)]
    pub customer_type: CustomerType,
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    #[serde(default)]
    pub method: PricingMethod,
    #[serde(default)]
    pub markup_pct: Option<Decimal>,
    #[serde(default)]
    pub target_margin_pct: Option<Decimal>,
    #[serde(default)]
    pub competitor_prices: Vec<Decimal>,
    #[serde(default)]
    pub volume_tiers: Vec<VolumeTier>,
    #[serde(default)]
    pub demand: DemandLevel,
    #[serde(default)]
    pub contract_price: Option<Decimal>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    /// Falls back to the engine's base currency.
    #[serde(default)]
    pub currency: Option<String>,
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}

impl PricingRequest {
    pub fn new(cost_price: Decimal, method: PricingMethod) -> Self {
        Self {
            cost_price,
            customer_type: CustomerType::default(),
            quantity: Decimal::ONE,
            method,
            markup_pct: None,
            target_margin_pct: None,
            competitor_prices: Vec::new(),
            volume_tiers: Vec::new(),
            demand: DemandLevel::default(),
            contract_price: None,
            min_price: None,
            max_price: None,
            currency: None,
        }
    }

    /// Cost-plus request seeded from catalog data; callers switch `method`
    /// and fill method inputs as needed.
    pub fn for_item(item: &Item, customer: &Customer, quantity: Decimal) -> Self {
        Self {
            customer_type: customer.customer_type,
            quantity,
            markup_pct: item.markup_pct,
            ..Self::new(item.cost_price, PricingMethod::CostPlus)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub method: PricingMethod,
    pub cost_price: Decimal,
    pub quantity: Decimal,
    /// Method output before floor/ceiling.
    pub base_price: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub clamped_by: Option<PriceClamp>,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub converted_unit_price: Decimal,
    pub converted_line_total: Decimal,
    pub margin_pct: Decimal,
    pub markup_pct: Decimal,
    pub competitor_average: Option<Decimal>,
    pub position: Option<CompetitivePosition>,
    pub applied_tier: Option<VolumeTier>,
    pub trace: Vec<PricingTraceStep>,
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, request: &PricingRequest) -> Result<PriceBreakdown, PricingError>;
}

pub struct DeterministicPricingEngine {
    config: PricingConfig,
    converter: CurrencyConverter,
}

impl DeterministicPricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        let converter = CurrencyConverter::new(&config.base_currency, &config.exchange_rates);
        Self { config, converter }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn converter(&self) -> &CurrencyConverter {
        &self.converter
    }
}

impl Default for DeterministicPricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

impl PricingEngine for DeterministicPricingEngine {
    fn price(&self, request: &PricingRequest) -> Result<PriceBreakdown, PricingError> {
        price_with_trace(request, &self.config, &self.converter)
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn pct(value: Decimal) -> Decimal {
    value / Decimal::ONE_HUNDRED
}

fn out_of_range() -> PricingError {
    PricingError::InvalidInput("Price out of range".to_string())
}

fn mul(left: Decimal, right: Decimal) -> Result<Decimal, PricingError> {
    left.checked_mul(right).ok_or_else(out_of_range)
}

fn div(left: Decimal, right: Decimal) -> Result<Decimal, PricingError> {
    left.checked_div(right).ok_or_else(out_of_range)
}

fn add(left: Decimal, right: Decimal) -> Result<Decimal, PricingError> {
    left.checked_add(right).ok_or_else(out_of_range)
}

fn sub(left: Decimal, right: Decimal) -> Result<Decimal, PricingError> {
    left.checked_sub(right).ok_or_else(out_of_range)
}

pub fn calculate_cost_plus(cost: Decimal, markup_pct: Decimal) -> Result<Decimal, PricingError> {
    mul(cost, add(Decimal::ONE, pct(markup_pct))?)
}

pub fn calculate_margin_based(cost: Decimal, margin_pct: Decimal) -> Result<Decimal, PricingError> {
    if margin_pct >= Decimal::ONE_HUNDRED {
        return Err(PricingError::MarginTooHigh);
    }
    div(cost, Decimal::ONE - pct(margin_pct))
}

pub fn competitor_average(prices: &[Decimal]) -> Result<Option<Decimal>, PricingError> {
    if prices.is_empty() {
        return Ok(None);
    }
    let total = prices.iter().try_fold(Decimal::ZERO, |sum, price| add(sum, *price))?;
    div(total, Decimal::from(prices.len())).map(Some)
}

/// Undercuts the competitor average, never below the minimum-margin price.
pub fn calculate_competitive(
    cost: Decimal,
    competitor_prices: &[Decimal],
    config: &PricingConfig,
) -> Result<Decimal, PricingError> {
    let average =
        competitor_average(competitor_prices)?.ok_or(PricingError::MissingCompetitorPrices)?;
    let undercut = mul(average, Decimal::ONE - pct(config.competitive_discount_pct))?;
    let floor = calculate_margin_based(cost, config.minimum_margin_pct)?;
    Ok(undercut.max(floor))
}

pub fn calculate_volume_tiered<'a>(
    cost: Decimal,
    quantity: Decimal,
    tiers: &'a [VolumeTier],
    config: &PricingConfig,
) -> Result<(Decimal, Option<&'a VolumeTier>), PricingError> {
    let base = calculate_cost_plus(cost, config.volume_base_markup_pct)?;
    match resolve_tier(quantity, tiers) {
        Some(tier) => {
            let price = match tier.special_price {
                Some(special) => special,
                None => mul(base, Decimal::ONE - pct(tier.discount_pct))?,
            };
            Ok((price, Some(tier)))
        }
        None => Ok((base, None)),
    }
}

pub fn calculate_dynamic(
    cost: Decimal,
    demand: DemandLevel,
    competitor_prices: &[Decimal],
    config: &PricingConfig,
) -> Result<Decimal, PricingError> {
    let base = calculate_cost_plus(cost, config.dynamic_base_markup_pct)?;
    let adjustment = pct(config.dynamic_demand_adjustment_pct);
    let adjusted = match demand {
        DemandLevel::High => mul(base, Decimal::ONE + adjustment)?,
        DemandLevel::Low => mul(base, Decimal::ONE - adjustment)?,
        DemandLevel::Normal => base,
    };

    match competitor_average(competitor_prices)? {
        Some(average) => {
            let band = pct(config.dynamic_competitor_band_pct);
            let floor = mul(average, Decimal::ONE - band)?;
            let ceiling = mul(average, Decimal::ONE + band)?;
            Ok(adjusted.max(floor).min(ceiling))
        }
        None => Ok(adjusted),
    }
}

pub fn price_with_trace(
    request: &PricingRequest,
    config: &PricingConfig,
    converter: &CurrencyConverter,
) -> Result<PriceBreakdown, PricingError> {
    validate_request(request)?;

    let cost = request.cost_price;
    let competitor_avg = competitor_average(&request.competitor_prices)?;
    let mut trace = vec![step("cost", "item cost price", cost)];
    let mut applied_tier = None;

    let raw = match request.method {
        PricingMethod::CostPlus => {
            let markup = request
                .markup_pct
                .unwrap_or_else(|| config.default_markup_pct(request.customer_type));
            let price = calculate_cost_plus(cost, markup)?;
            trace.push(step("cost_plus", format!("cost * (1 + {markup}%)"), price));
            price
        }
        PricingMethod::MarginBased => {
            let margin = request.target_margin_pct.unwrap_or(config.default_margin_pct);
            let price = calculate_margin_based(cost, margin)?;
            trace.push(step("margin_based", format!("cost / (1 - {margin}%)"), price));
            price
        }
        PricingMethod::Competitive => {
            let price = calculate_competitive(cost, &request.competitor_prices, config)?;
            trace.push(step(
                "competitive",
                format!(
                    "max(avg * (1 - {}%), minimum {}% margin price)",
                    config.competitive_discount_pct, config.minimum_margin_pct
                ),
                price,
            ));
            price
        }
        PricingMethod::VolumeTiered => {
            let (price, tier) =
                calculate_volume_tiered(cost, request.quantity, &request.volume_tiers, config)?;
            let detail = match tier {
                Some(tier) if tier.special_price.is_some() => "tier special price".to_string(),
                Some(tier) => format!(
                    "cost * (1 + {}%) less {}% tier discount",
                    config.volume_base_markup_pct, tier.discount_pct
                ),
                None => format!("no tier matched; cost * (1 + {}%)", config.volume_base_markup_pct),
            };
            trace.push(step("volume_tiered", detail, price));
            applied_tier = tier.cloned();
            price
        }
        PricingMethod::Dynamic => {
            let price =
                calculate_dynamic(cost, request.demand, &request.competitor_prices, config)?;
            trace.push(step(
                "dynamic",
                format!(
                    "cost * (1 + {}%) adjusted for {:?} demand",
                    config.dynamic_base_markup_pct, request.demand
                ),
                price,
            ));
            price
        }
        PricingMethod::Contract => {
            let price = request.contract_price.ok_or(PricingError::MissingContractPrice)?;
            trace.push(step("contract", "fixed contract price", price));
            price
        }
    };

    let (clamped, clamped_by) = apply_bounds(raw, request.min_price, request.max_price)?;
    if let Some(bound) = clamped_by {
        trace.push(step("bound", format!("{bound:?} price applied"), clamped));
    }

    let unit_price = round_money(clamped);
    let line_total = round_money(mul(unit_price, request.quantity)?);
    trace.push(step("rounded", "unit price rounded to 2dp", unit_price));

    let currency = request
        .currency
        .as_deref()
        .map(|code| code.trim().to_ascii_uppercase())
        .unwrap_or_else(|| converter.base().to_string());
    let exchange_rate = converter.rate(&currency)?;
    let converted_unit_price = round_money(mul(unit_price, exchange_rate)?);
    let converted_line_total = round_money(mul(converted_unit_price, request.quantity)?);
    if currency != converter.base() {
        trace.push(step(
            "currency",
            format!("{} -> {currency} at {exchange_rate}", converter.base()),
            converted_unit_price,
        ));
    }

    let profit = sub(unit_price, cost)?;
    let margin_pct = ratio_pct(profit, unit_price)?;
    let markup_pct = ratio_pct(profit, cost)?;
    let position = competitor_avg
        .map(|average| position(unit_price, average, config))
        .transpose()?;

    Ok(PriceBreakdown {
        method: request.method,
        cost_price: cost,
        quantity: request.quantity,
        base_price: round_money(raw),
        unit_price,
        line_total,
        clamped_by,
        currency,
        exchange_rate,
        converted_unit_price,
        converted_line_total,
        margin_pct,
        markup_pct,
        competitor_average: competitor_avg.map(round_money),
        position,
        applied_tier,
        trace,
    })
}

/// Builds a quotation line priced in the request currency.
pub fn price_quotation_line(
    engine: &dyn PricingEngine,
    item: &Item,
    request: &PricingRequest,
) -> Result<(QuotationItem, PriceBreakdown), PricingError> {
    let breakdown = engine.price(request)?;
    let line = QuotationItem::new(
        Some(item.id.clone()),
        item.name.clone(),
        request.quantity,
        breakdown.converted_unit_price,
    );
    Ok((line, breakdown))
}

fn validate_request(request: &PricingRequest) -> Result<(), PricingError> {
    if request.cost_price < Decimal::ZERO {
        return Err(PricingError::InvalidInput("Cost price cannot be negative".to_string()));
    }
    if request.quantity <= Decimal::ZERO {
        return Err(PricingError::InvalidInput("Quantity must be greater than zero".to_string()));
    }
    if request.competitor_prices.iter().any(|price| *price <= Decimal::ZERO) {
        return Err(PricingError::InvalidInput("Competitor prices must be positive".to_string()));
    }
    if request.method == PricingMethod::VolumeTiered {
        if let Some(issue) = validate_tiers(&request.volume_tiers).into_iter().find(|issue| issue.is_blocking()) {
            return Err(PricingError::InvalidInput(format!("Invalid volume tier: {issue:?}")));
        }
    }
    Ok(())
}

fn apply_bounds(
    price: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
) -> Result<(Decimal, Option<PriceClamp>), PricingError> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(PricingError::InvalidClampRange { min, max });
        }
    }

    match (min, max) {
        (Some(min), _) if price < min => Ok((min, Some(PriceClamp::Minimum))),
        (_, Some(max)) if price > max => Ok((max, Some(PriceClamp::Maximum))),
        _ => Ok((price, None)),
    }
}

fn ratio_pct(numerator: Decimal, denominator: Decimal) -> Result<Decimal, PricingError> {
    if denominator.is_zero() {
        return Ok(Decimal::ZERO);
    }
    mul(div(numerator, denominator)?, Decimal::ONE_HUNDRED).map(round_money)
}

fn position(
    price: Decimal,
    average: Decimal,
    config: &PricingConfig,
) -> Result<CompetitivePosition, PricingError> {
    let tolerance = mul(average, pct(config.position_tolerance_pct))?;
    Ok(if sub(price, average)?.abs() <= tolerance {
        CompetitivePosition::At
    } else if price > average {
        CompetitivePosition::Above
    } else {
        CompetitivePosition::Below
    })
}

fn step(stage: &str, detail: impl Into<String>, amount: Decimal) -> PricingTraceStep {
    PricingTraceStep { stage: stage.to_string(), detail: detail.into(), amount }
}
