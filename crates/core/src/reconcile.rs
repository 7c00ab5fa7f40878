//! Purchase-order reconciliation against the active customer acceptance.
//!
//! Reconciliation never rejects a PO. Each problem becomes an issue and the
//! order is marked for review.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::acceptance::CustomerAcceptance;
use crate::domain::purchase_order::{PoLineItem, PurchaseOrderStatus};
use crate::domain::quotation::{Quotation, QuotationId, QuotationItemId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingReference,
    UnknownQuotationItem,
    ItemNotAccepted,
    QuantityExceedsAccepted,
    PriceMismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationIssue {
    /// 1-based position of the PO line.
    pub line: usize,
    pub kind: IssueKind,
    pub quotation_item_id: Option<QuotationItemId>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub quotation_id: QuotationId,
    pub status: PurchaseOrderStatus,
    pub checked_lines: usize,
    pub matched_lines: usize,
    pub issues: Vec<ReconciliationIssue>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn reconcile(
    lines: &[PoLineItem],
    quotation: &Quotation,
    acceptance: Option<&CustomerAcceptance>,
) -> ReconciliationReport {
    let acceptance = acceptance.filter(|acceptance| acceptance.is_active());
    let mut ordered: HashMap<&QuotationItemId, Decimal> = HashMap::new();
    let mut issues = Vec::new();
    let mut matched_lines = 0;

    for (index, line) in lines.iter().enumerate() {
        let number = index + 1;
        let before = issues.len();

        let Some(item_id) = line.quotation_item_id.as_ref() else {
            issues.push(issue(
                number,
                IssueKind::MissingReference,
                None,
                format!("Line {number} does not reference a quotation item"),
            ));
            continue;
        };

        let Some(quoted) = quotation.item(item_id) else {
            issues.push(issue(
                number,
                IssueKind::UnknownQuotationItem,
                Some(item_id),
                format!("Line {number} references {} which is not on the quotation", item_id.0),
            ));
            continue;
        };

        let Some(accepted) = acceptance.and_then(|acceptance| acceptance.accepted_item(item_id))
        else {
            issues.push(issue(
                number,
                IssueKind::ItemNotAccepted,
                Some(item_id),
                format!("Line {number} orders {} which the customer did not accept", quoted.description),
            ));
            continue;
        };

        let total_ordered = ordered.entry(item_id).or_insert(Decimal::ZERO);
        *total_ordered += line.quantity;
        if *total_ordered > accepted.accepted_quantity {
            issues.push(issue(
                number,
                IssueKind::QuantityExceedsAccepted,
                Some(item_id),
                format!(
                    "Line {number} orders {} of {} but only {} were accepted",
                    total_ordered, quoted.description, accepted.accepted_quantity
                ),
            ));
        }

        if line.unit_price != quoted.unit_price {
            issues.push(issue(
                number,
                IssueKind::PriceMismatch,
                Some(item_id),
                format!(
                    "Line {number} prices {} at {} but the quotation says {}",
                    quoted.description, line.unit_price, quoted.unit_price
                ),
            ));
        }

        if issues.len() == before {
            matched_lines += 1;
        }
    }

    let status = if issues.is_empty() {
        PurchaseOrderStatus::Validated
    } else {
        PurchaseOrderStatus::RequiresReview
    };

    ReconciliationReport {
        quotation_id: quotation.id.clone(),
        status,
        checked_lines: lines.len(),
        matched_lines,
        issues,
    }
}

fn issue(
    line: usize,
    kind: IssueKind,
    quotation_item_id: Option<&QuotationItemId>,
    message: String,
) -> ReconciliationIssue {
    ReconciliationIssue { line, kind, quotation_item_id: quotation_item_id.cloned(), message }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{reconcile, IssueKind};
    use crate::domain::acceptance::{
        AcceptanceId, AcceptanceStatus, AcceptanceType, CustomerAcceptance,
        QuotationItemAcceptance,
    };
    use crate::domain::customer::CustomerId;
    use crate::domain::purchase_order::{PoLineItem, PurchaseOrderStatus};
    use crate::domain::quotation::{Quotation, QuotationItem, QuotationItemId, QuotationStatus};

    fn accepted_quotation() -> (Quotation, CustomerAcceptance) {
        let mut quotation = Quotation::draft(
            "QT-2026-0100",
            CustomerId("CUS-3".to_string()),
            "USD",
            vec![
                QuotationItem::new(None, "Cable tray 3m", Decimal::new(50, 0), Decimal::new(1875, 2)),
                QuotationItem::new(None, "Junction box", Decimal::new(12, 0), Decimal::new(4200, 2)),
            ],
        );
        quotation.status = QuotationStatus::Accepted;

        let acceptance = CustomerAcceptance {
            id: AcceptanceId("ACC-1".to_string()),
            quotation_id: quotation.id.clone(),
            acceptance_type: AcceptanceType::Partial,
            status: AcceptanceStatus::Active,
            accepted_by: "buyer".to_string(),
            notes: None,
            accepted_at: Utc::now(),
            items: vec![
                QuotationItemAcceptance {
                    id: "QIA-1".to_string(),
                    quotation_item_id: quotation.items[0].id.clone(),
                    is_accepted: true,
                    accepted_quantity: Decimal::new(30, 0),
                    notes: None,
                },
                QuotationItemAcceptance {
                    id: "QIA-2".to_string(),
                    quotation_item_id: quotation.items[1].id.clone(),
                    is_accepted: false,
                    accepted_quantity: Decimal::ZERO,
                    notes: None,
                },
            ],
        };
        (quotation, acceptance)
    }

    fn line(item: Option<&QuotationItemId>, quantity: i64, unit_price: Decimal) -> PoLineItem {
        PoLineItem {
            id: "POL-1".to_string(),
            quotation_item_id: item.cloned(),
            description: "ordered".to_string(),
            quantity: Decimal::new(quantity, 0),
            unit_price,
        }
    }

    #[test]
    fn matching_lines_validate() {
        let (quotation, acceptance) = accepted_quotation();
        let lines = vec![line(Some(&quotation.items[0].id), 30, Decimal::new(1875, 2))];

        let report = reconcile(&lines, &quotation, Some(&acceptance));

        assert!(report.is_clean());
        assert_eq!(report.status, PurchaseOrderStatus::Validated);
        assert_eq!(report.matched_lines, 1);
    }

    #[test]
    fn unaccepted_item_is_reported_not_rejected() {
        let (quotation, acceptance) = accepted_quotation();
        let lines = vec![
            line(Some(&quotation.items[0].id), 10, Decimal::new(1875, 2)),
            line(Some(&quotation.items[1].id), 2, Decimal::new(4200, 2)),
        ];

        let report = reconcile(&lines, &quotation, Some(&acceptance));

        assert_eq!(report.status, PurchaseOrderStatus::RequiresReview);
        assert_eq!(report.matched_lines, 1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::ItemNotAccepted);
        assert_eq!(report.issues[0].line, 2);
    }

    #[test]
    fn missing_and_unknown_references_are_reported() {
        let (quotation, acceptance) = accepted_quotation();
        let foreign = QuotationItemId("QI-elsewhere".to_string());
        let lines =
            vec![line(None, 1, Decimal::ONE), line(Some(&foreign), 1, Decimal::ONE)];

        let report = reconcile(&lines, &quotation, Some(&acceptance));
        let kinds: Vec<IssueKind> = report.issues.iter().map(|issue| issue.kind).collect();

        assert_eq!(kinds, vec![IssueKind::MissingReference, IssueKind::UnknownQuotationItem]);
        assert_eq!(report.matched_lines, 0);
    }

    #[test]
    fn quantity_above_accepted_counts_across_lines() {
        let (quotation, acceptance) = accepted_quotation();
        let id = &quotation.items[0].id;
        let lines =
            vec![line(Some(id), 20, Decimal::new(1875, 2)), line(Some(id), 15, Decimal::new(1875, 2))];

        let report = reconcile(&lines, &quotation, Some(&acceptance));

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::QuantityExceedsAccepted);
        assert_eq!(report.issues[0].line, 2);
    }

    #[test]
    fn price_mismatch_is_scale_insensitive() {
        let (quotation, acceptance) = accepted_quotation();
        let id = &quotation.items[0].id;

        let same = reconcile(
            &[line(Some(id), 5, Decimal::new(187500, 4))],
            &quotation,
            Some(&acceptance),
        );
        assert!(same.is_clean());

        let different =
            reconcile(&[line(Some(id), 5, Decimal::new(1700, 2))], &quotation, Some(&acceptance));
        assert_eq!(different.issues[0].kind, IssueKind::PriceMismatch);
    }

    #[test]
    fn without_active_acceptance_nothing_is_accepted() {
        let (quotation, mut acceptance) = accepted_quotation();
        let lines = vec![line(Some(&quotation.items[0].id), 1, Decimal::new(1875, 2))];

        let none = reconcile(&lines, &quotation, None);
        assert_eq!(none.issues[0].kind, IssueKind::ItemNotAccepted);

        acceptance.status = AcceptanceStatus::Superseded;
        let superseded = reconcile(&lines, &quotation, Some(&acceptance));
        assert_eq!(superseded.issues[0].kind, IssueKind::ItemNotAccepted);
    }
}
