//! Building customer acceptances from quotation item selections.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::acceptance::{
    AcceptanceId, AcceptanceStatus, AcceptanceType, CustomerAcceptance, QuotationItemAcceptance,
};
use crate::domain::new_id;
use crate::domain::quotation::{Quotation, QuotationItemId, QuotationStatus};
use crate::pricing::round_money;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AcceptanceError {
    #[error("Quotation must be Sent before recording acceptance")]
    QuotationNotSent { status: QuotationStatus },
    #[error("At least one item must be accepted")]
    NothingAccepted,
    #[error("Quotation item {0} is not part of this quotation")]
    UnknownItem(String),
    #[error("Quotation item {0} is selected more than once")]
    DuplicateSelection(String),
    #[error("accepted_by is required")]
    MissingAcceptedBy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSelection {
    pub quotation_item_id: QuotationItemId,
    /// Defaults to the quoted quantity.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceRequest {
    pub acceptance_type: AcceptanceType,
    pub accepted_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Ignored for full acceptances.
    #[serde(default)]
    pub items: Vec<ItemSelection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceSummary {
    pub total_items: usize,
    pub accepted_items: usize,
    pub accepted_value: Decimal,
    pub quoted_value: Decimal,
}

pub fn clamp_quantity(requested: Decimal, quoted: Decimal) -> Decimal {
    requested.max(Decimal::ZERO).min(quoted)
}

/// Builds an Active acceptance with one entry per quotation item. Items the
/// caller did not select are recorded as not accepted.
pub fn build_acceptance(
    quotation: &Quotation,
    request: &AcceptanceRequest,
) -> Result<CustomerAcceptance, AcceptanceError> {
    if !matches!(quotation.status, QuotationStatus::Sent | QuotationStatus::Accepted) {
        return Err(AcceptanceError::QuotationNotSent { status: quotation.status });
    }
    if request.accepted_by.trim().is_empty() {
        return Err(AcceptanceError::MissingAcceptedBy);
    }

    let selections = match request.acceptance_type {
        AcceptanceType::Full => BTreeMap::new(),
        AcceptanceType::Partial => index_selections(quotation, &request.items)?,
    };

    let items: Vec<QuotationItemAcceptance> = quotation
        .items
        .iter()
        .map(|item| {
            let (accepted_quantity, notes) = match request.acceptance_type {
                AcceptanceType::Full => (item.quantity, None),
                AcceptanceType::Partial => match selections.get(&item.id) {
                    Some(selection) => (
                        clamp_quantity(selection.quantity.unwrap_or(item.quantity), item.quantity),
                        selection.notes.clone(),
                    ),
                    None => (Decimal::ZERO, None),
                },
            };

            QuotationItemAcceptance {
                id: new_id("QIA"),
                quotation_item_id: item.id.clone(),
                is_accepted: accepted_quantity > Decimal::ZERO,
                accepted_quantity,
                notes,
            }
        })
        .collect();

    if !items.iter().any(|entry| entry.is_accepted) {
        return Err(AcceptanceError::NothingAccepted);
    }

    Ok(CustomerAcceptance {
        id: AcceptanceId(new_id("ACC")),
        quotation_id: quotation.id.clone(),
        acceptance_type: request.acceptance_type,
        status: AcceptanceStatus::Active,
        accepted_by: request.accepted_by.trim().to_string(),
        notes: request.notes.clone(),
        accepted_at: Utc::now(),
        items,
    })
}

pub fn summarize(quotation: &Quotation, acceptance: &CustomerAcceptance) -> AcceptanceSummary {
    let accepted_value = acceptance
        .accepted_items()
        .filter_map(|entry| {
            quotation
                .item(&entry.quotation_item_id)
                .map(|item| round_money(entry.accepted_quantity * item.unit_price))
        })
        .sum();

    AcceptanceSummary {
        total_items: quotation.items.len(),
        accepted_items: acceptance.accepted_items().count(),
        accepted_value,
        quoted_value: quotation.subtotal,
    }
}

fn index_selections<'a>(
    quotation: &Quotation,
    selections: &'a [ItemSelection],
) -> Result<BTreeMap<QuotationItemId, &'a ItemSelection>, AcceptanceError> {
    let mut indexed = BTreeMap::new();
    for selection in selections {
        if quotation.item(&selection.quotation_item_id).is_none() {
            return Err(AcceptanceError::UnknownItem(selection.quotation_item_id.0.clone()));
        }
        if indexed.insert(selection.quotation_item_id.clone(), selection).is_some() {
            return Err(AcceptanceError::DuplicateSelection(selection.quotation_item_id.0.clone()));
        }
    }
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        build_acceptance, clamp_quantity, summarize, AcceptanceError, AcceptanceRequest,
        ItemSelection,
    };
    use crate::domain::acceptance::{AcceptanceStatus, AcceptanceType};
    use crate::domain::customer::CustomerId;
    use crate::domain::quotation::{Quotation, QuotationItem, QuotationItemId, QuotationStatus};

    fn sent_quotation() -> Quotation {
        let mut quotation = Quotation::draft(
            "QT-2026-0042",
            CustomerId("CUS-7".to_string()),
            "USD",
            vec![
                QuotationItem::new(None, "Pump housing", Decimal::new(10, 0), Decimal::new(5000, 2)),
                QuotationItem::new(None, "Impeller", Decimal::new(4, 0), Decimal::new(12000, 2)),
                QuotationItem::new(None, "Seal kit", Decimal::new(20, 0), Decimal::new(850, 2)),
            ],
        );
        quotation.status = QuotationStatus::Sent;
        quotation
    }

    fn select(id: &QuotationItemId, quantity: Option<Decimal>) -> ItemSelection {
        ItemSelection { quotation_item_id: id.clone(), quantity, notes: None }
    }

    fn partial(items: Vec<ItemSelection>) -> AcceptanceRequest {
        AcceptanceRequest {
            acceptance_type: AcceptanceType::Partial,
            accepted_by: "procurement@gulfmarine.example".to_string(),
            notes: None,
            items,
        }
    }

    #[test]
    fn clamps_to_zero_and_quoted_quantity() {
        let quoted = Decimal::new(10, 0);
        assert_eq!(clamp_quantity(Decimal::new(-3, 0), quoted), Decimal::ZERO);
        assert_eq!(clamp_quantity(Decimal::new(25, 0), quoted), quoted);
        assert_eq!(clamp_quantity(Decimal::new(45, 1), quoted), Decimal::new(45, 1));
    }

    #[test]
    fn full_acceptance_accepts_every_item_at_quoted_quantity() {
        let quotation = sent_quotation();
        let acceptance = build_acceptance(
            &quotation,
            &AcceptanceRequest { acceptance_type: AcceptanceType::Full, ..partial(Vec::new()) },
        )
        .expect("full acceptance");

        assert_eq!(acceptance.status, AcceptanceStatus::Active);
        assert_eq!(acceptance.items.len(), 3);
        for (entry, item) in acceptance.items.iter().zip(&quotation.items) {
            assert!(entry.is_accepted);
            assert_eq!(entry.accepted_quantity, item.quantity);
        }
    }

    #[test]
    fn partial_acceptance_clamps_and_records_unselected_items() {
        let quotation = sent_quotation();
        let request = partial(vec![
            select(&quotation.items[0].id, Some(Decimal::new(15, 0))),
            select(&quotation.items[1].id, Some(Decimal::ZERO)),
        ]);

        let acceptance = build_acceptance(&quotation, &request).expect("partial acceptance");

        assert_eq!(acceptance.items.len(), 3);
        assert!(acceptance.items[0].is_accepted);
        assert_eq!(acceptance.items[0].accepted_quantity, Decimal::new(10, 0));
        assert!(!acceptance.items[1].is_accepted);
        assert_eq!(acceptance.items[1].accepted_quantity, Decimal::ZERO);
        assert!(!acceptance.items[2].is_accepted);
        assert!(acceptance.accepted_item(&quotation.items[1].id).is_none());
    }

    #[test]
    fn selection_without_quantity_takes_quoted_quantity() {
        let quotation = sent_quotation();
        let acceptance =
            build_acceptance(&quotation, &partial(vec![select(&quotation.items[2].id, None)]))
                .expect("partial acceptance");

        let entry = acceptance.accepted_item(&quotation.items[2].id).expect("seal kit accepted");
        assert_eq!(entry.accepted_quantity, Decimal::new(20, 0));
    }

    #[test]
    fn partial_acceptance_with_nothing_accepted_is_rejected() {
        let quotation = sent_quotation();
        let error = build_acceptance(
            &quotation,
            &partial(vec![select(&quotation.items[0].id, Some(Decimal::new(-1, 0)))]),
        )
        .expect_err("nothing accepted");

        assert_eq!(error, AcceptanceError::NothingAccepted);
        assert_eq!(error.to_string(), "At least one item must be accepted");

        let empty = build_acceptance(&quotation, &partial(Vec::new())).expect_err("empty");
        assert_eq!(empty, AcceptanceError::NothingAccepted);
    }

    #[test]
    fn unknown_and_duplicate_selections_are_rejected() {
        let quotation = sent_quotation();
        let unknown = build_acceptance(
            &quotation,
            &partial(vec![select(&QuotationItemId("QI-nope".to_string()), None)]),
        )
        .expect_err("unknown item");
        assert_eq!(unknown, AcceptanceError::UnknownItem("QI-nope".to_string()));

        let id = &quotation.items[0].id;
        let duplicate = build_acceptance(&quotation, &partial(vec![select(id, None), select(id, None)]))
            .expect_err("duplicate item");
        assert!(matches!(duplicate, AcceptanceError::DuplicateSelection(_)));
    }

    #[test]
    fn draft_quotations_cannot_be_accepted() {
        let mut quotation = sent_quotation();
        quotation.status = QuotationStatus::Draft;

        let error = build_acceptance(&quotation, &partial(vec![select(&quotation.items[0].id, None)]))
            .expect_err("draft");
        assert_eq!(error.to_string(), "Quotation must be Sent before recording acceptance");
    }

    #[test]
    fn summary_values_accepted_quantities_at_quoted_prices() {
        let quotation = sent_quotation();
        let acceptance = build_acceptance(
            &quotation,
            &partial(vec![
                select(&quotation.items[0].id, Some(Decimal::new(6, 0))),
                select(&quotation.items[1].id, None),
            ]),
        )
        .expect("partial acceptance");

        let summary = summarize(&quotation, &acceptance);
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.accepted_items, 2);
        assert_eq!(summary.accepted_value, Decimal::new(78000, 2));
        assert_eq!(summary.quoted_value, Decimal::new(115000, 2));
    }
}
