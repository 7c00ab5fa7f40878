use std::collections::HashMap;

use tokio::sync::RwLock;

use tradeflow_core::domain::acceptance::{AcceptanceId, AcceptanceStatus, CustomerAcceptance};
use tradeflow_core::domain::customer::{Customer, CustomerId};
use tradeflow_core::domain::item::{Item, ItemId};
use tradeflow_core::domain::purchase_order::{PurchaseOrder, PurchaseOrderId};
use tradeflow_core::domain::quotation::{Quotation, QuotationId};

use super::{
    AcceptanceRepository, CustomerRepository, ItemRepository, PurchaseOrderRepository,
    QuotationRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<String, Customer>>,
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&id.0).cloned())
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.id.0.clone(), customer);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryItemRepository {
    items: RwLock<HashMap<String, Item>>,
}

#[async_trait::async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.get(&id.0).cloned())
    }

    async fn save(&self, item: Item) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(item.id.0.clone(), item);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryQuotationRepository {
    quotations: RwLock<HashMap<String, Quotation>>,
}

#[async_trait::async_trait]
impl QuotationRepository for InMemoryQuotationRepository {
    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let quotations = self.quotations.read().await;
        Ok(quotations.get(&id.0).cloned())
    }

    async fn save(&self, quotation: Quotation) -> Result<(), RepositoryError> {
        let mut quotations = self.quotations.write().await;
        let number_taken = quotations.values().any(|existing| {
            existing.id != quotation.id && existing.quotation_number == quotation.quotation_number
        });
        if number_taken {
            return Err(RepositoryError::Conflict(format!(
                "quotation number {} already exists",
                quotation.quotation_number
            )));
        }
        quotations.insert(quotation.id.0.clone(), quotation);
        Ok(())
    }

    async fn list_revisions(
        &self,
        parent_id: &QuotationId,
    ) -> Result<Vec<Quotation>, RepositoryError> {
        let quotations = self.quotations.read().await;
        let mut revisions: Vec<Quotation> = quotations
            .values()
            .filter(|quotation| quotation.parent_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        revisions.sort_by_key(|quotation| quotation.revision);
        Ok(revisions)
    }
}

/// Acceptances in insertion order; the write lock makes supersede + insert atomic.
#[derive(Default)]
pub struct InMemoryAcceptanceRepository {
    acceptances: RwLock<Vec<CustomerAcceptance>>,
}

#[async_trait::async_trait]
impl AcceptanceRepository for InMemoryAcceptanceRepository {
    async fn record(
        &self,
        acceptance: CustomerAcceptance,
    ) -> Result<Vec<AcceptanceId>, RepositoryError> {
        let mut acceptances = self.acceptances.write().await;
        let mut superseded = Vec::new();
        for existing in acceptances.iter_mut().filter(|existing| {
            existing.quotation_id == acceptance.quotation_id && existing.is_active()
        }) {
            existing.status = AcceptanceStatus::Superseded;
            superseded.push(existing.id.clone());
        }
        acceptances.push(acceptance);
        Ok(superseded)
    }

    async fn find_by_id(
        &self,
        id: &AcceptanceId,
    ) -> Result<Option<CustomerAcceptance>, RepositoryError> {
        let acceptances = self.acceptances.read().await;
        Ok(acceptances.iter().find(|acceptance| &acceptance.id == id).cloned())
    }

    async fn find_active(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Option<CustomerAcceptance>, RepositoryError> {
        let acceptances = self.acceptances.read().await;
        Ok(acceptances
            .iter()
            .find(|acceptance| &acceptance.quotation_id == quotation_id && acceptance.is_active())
            .cloned())
    }

    async fn list_for_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<CustomerAcceptance>, RepositoryError> {
        let acceptances = self.acceptances.read().await;
        Ok(acceptances
            .iter()
            .rev()
            .filter(|acceptance| &acceptance.quotation_id == quotation_id)
            .cloned()
            .collect())
    }

    async fn cancel(&self, id: &AcceptanceId) -> Result<bool, RepositoryError> {
        let mut acceptances = self.acceptances.write().await;
        match acceptances.iter_mut().find(|acceptance| &acceptance.id == id) {
            Some(acceptance) if acceptance.is_active() => {
                acceptance.status = AcceptanceStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPurchaseOrderRepository {
    orders: RwLock<Vec<PurchaseOrder>>,
}

#[async_trait::async_trait]
impl PurchaseOrderRepository for InMemoryPurchaseOrderRepository {
    async fn find_by_id(
        &self,
        id: &PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn save(&self, purchase_order: PurchaseOrder) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|order| order.id == purchase_order.id) {
            Some(existing) => *existing = purchase_order,
            None => orders.push(purchase_order),
        }
        Ok(())
    }

    async fn list_for_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<PurchaseOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().filter(|order| &order.quotation_id == quotation_id).cloned().collect())
    }
}
