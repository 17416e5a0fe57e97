use std::collections::{btree_map::Entry, BTreeMap, HashMap};

use chrono::NaiveDate;
use tokio::sync::RwLock;

use kodbook_core::domain::order::{AssignmentOutcome, ExistingOrder, OrderCode, OrderRecord};

use super::{
    assignment_outcome, ensure_listable, existing_order, is_assigned, OrderRepository,
    RepositoryError,
};

#[derive(Clone, Debug, Default)]
struct ListingEntry {
    transport: Option<String>,
    phone: Option<String>,
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<(OrderCode, NaiveDate), OrderRecord>>,
    listing: RwLock<BTreeMap<(NaiveDate, OrderCode), ListingEntry>>,
}

impl InMemoryOrderRepository {
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn list_available_codes(
        &self,
        date: NaiveDate,
        only_unassigned: bool,
    ) -> Result<Vec<OrderCode>, RepositoryError> {
        let listing = self.listing.read().await;
        Ok(listing
            .iter()
            .filter(|((listed_on, _), _)| *listed_on == date)
            .filter(|(_, entry)| {
                is_assigned(entry.transport.as_deref(), entry.phone.as_deref()) != only_unassigned
            })
            .map(|((_, code), _)| code.clone())
            .collect())
    }

    async fn find_existing_order(
        &self,
        code: &OrderCode,
        date: NaiveDate,
    ) -> Result<Option<ExistingOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&(code.clone(), date)).cloned().map(existing_order))
    }

    async fn add_order(&self, record: &OrderRecord) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let key = (record.code.clone(), record.date);
        if orders.contains_key(&key) {
            return Err(RepositoryError::Duplicate { code: record.code.clone(), date: record.date });
        }
        orders.insert(key, record.clone());
        Ok(())
    }

    async fn update_order(
        &self,
        code: &OrderCode,
        record: &OrderRecord,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let Some(existing) = orders.remove(&(code.clone(), record.date)) else {
            return Err(RepositoryError::NotFound { code: code.clone(), date: record.date });
        };
        let updated = OrderRecord { code: existing.code, ..record.clone() };
        orders.insert((updated.code.clone(), updated.date), updated);
        Ok(())
    }

    async fn propagate_assignment(
        &self,
        code: &OrderCode,
        transport: &str,
        phone: &str,
        date: NaiveDate,
    ) -> Result<AssignmentOutcome, RepositoryError> {
        let mut listing = self.listing.write().await;
        let updated = match listing.get_mut(&(date, code.clone())) {
            Some(entry) => {
                entry.transport = Some(transport.to_owned());
                entry.phone = Some(phone.to_owned());
                true
            }
            None => false,
        };
        Ok(assignment_outcome(code, date, updated))
    }

    async fn register_codes(
        &self,
        date: NaiveDate,
        codes: &[OrderCode],
    ) -> Result<usize, RepositoryError> {
        ensure_listable(codes)?;
        let mut listing = self.listing.write().await;
        let mut added = 0;
        for code in codes {
            if let Entry::Vacant(slot) = listing.entry((date, code.clone())) {
                slot.insert(ListingEntry::default());
                added += 1;
            }
        }
        Ok(added)
    }
}
