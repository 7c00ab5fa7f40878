use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{round_money, PricingError};

/// Static rate table keyed by upper-case ISO code. A rate is the number of
/// target-currency units per one base-currency unit.
///
/// Input tables may be quoted against any reference currency; `new` rebases
/// them so the base currency has rate 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConverter {
    base: String,
    rates: BTreeMap<String, Decimal>,
}

impl CurrencyConverter {
    pub fn new(base: &str, rates: &BTreeMap<String, Decimal>) -> Self {
        let base = normalize(base);
        let quoted: BTreeMap<String, Decimal> =
            rates.iter().map(|(code, rate)| (normalize(code), *rate)).collect();

        let mut rates: BTreeMap<String, Decimal> = match quoted.get(&base) {
            Some(base_rate) if *base_rate > Decimal::ZERO && *base_rate != Decimal::ONE => quoted
                .iter()
                .filter_map(|(code, rate)| {
                    rate.checked_div(*base_rate).map(|rebased| (code.clone(), rebased))
                })
                .collect(),
            _ => quoted,
        };
        rates.insert(base.clone(), Decimal::ONE);
        Self { base, rates }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn rate(&self, currency: &str) -> Result<Decimal, PricingError> {
        let code = normalize(currency);
        self.rates.get(&code).copied().ok_or(PricingError::UnsupportedCurrency(code))
    }

    pub fn convert(&self, amount: Decimal, to: &str) -> Result<Decimal, PricingError> {
        let rate = self.rate(to)?;
        amount
            .checked_mul(rate)
            .map(round_money)
            .ok_or_else(|| PricingError::InvalidInput("Price out of range".to_string()))
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }
}

impl Default for CurrencyConverter {
    fn default() -> Self {
        Self::new("USD", &default_rates())
    }
}

pub fn default_rates() -> BTreeMap<String, Decimal> {
    [
        ("USD", Decimal::ONE),
        ("EUR", Decimal::new(92, 2)),
        ("GBP", Decimal::new(79, 2)),
        ("AED", Decimal::new(36725, 4)),
        ("INR", Decimal::new(8312, 2)),
        ("SAR", Decimal::new(375, 2)),
    ]
    .into_iter()
    .map(|(code, rate)| (code.to_string(), rate))
    .collect()
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
