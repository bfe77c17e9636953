use crate::analytics::WorkOrderSummary;
use crate::backend::Backend;
use crate::error::BackendError;
use crate::keys::ResourceKind;
use crate::models::{Customer, Vehicle, WorkOrder, WorkOrderStatus};
use request_cache::{CacheConfig, CacheStats, RequestCache};
use serde::Serialize;
use std::sync::Arc;

/// Everything the customer detail view shows
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub customer: Arc<Customer>,
    pub vehicles: Arc<Vec<Vehicle>>,
    pub work_orders: Arc<Vec<WorkOrder>>,
    pub summary: WorkOrderSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoaderStats {
    pub customers: CacheStats,
    pub vehicles: CacheStats,
    pub work_orders: CacheStats,
}

/// Reads customer records through per-resource request caches.
///
/// Concurrent reads of the same record share one backend call, and repeat
/// reads within the TTL don't reach the backend at all. Writes go straight to
/// the backend and then invalidate the keys they affect.
#[derive(Clone)]
pub struct CustomerDetailsLoader {
    backend: Arc<dyn Backend>,
    customers: RequestCache<Arc<Customer>, BackendError>,
    vehicles: RequestCache<Arc<Vec<Vehicle>>, BackendError>,
    work_orders: RequestCache<Arc<Vec<WorkOrder>>, BackendError>,
}

impl CustomerDetailsLoader {
    pub fn new(backend: Arc<dyn Backend>, config: CacheConfig) -> Self {
        Self {
            backend,
            customers: RequestCache::new(config.clone()),
            vehicles: RequestCache::new(config.clone()),
            work_orders: RequestCache::new(config),
        }
    }

    pub async fn customer(&self, id: u64) -> Result<Arc<Customer>, BackendError> {
        let backend = Arc::clone(&self.backend);
        self.customers
            .fetch_with_cache(ResourceKind::Customer.key(id), move || async move {
                backend.customer(id).await.map(Arc::new)
            })
            .await
    }

    pub async fn vehicles(&self, customer_id: u64) -> Result<Arc<Vec<Vehicle>>, BackendError> {
        let backend = Arc::clone(&self.backend);
        self.vehicles
            .fetch_with_cache(ResourceKind::Vehicles.key(customer_id), move || async move {
                backend.vehicles(customer_id).await.map(Arc::new)
            })
            .await
    }

    pub async fn work_orders(&self, customer_id: u64) -> Result<Arc<Vec<WorkOrder>>, BackendError> {
        let backend = Arc::clone(&self.backend);
        self.work_orders
            .fetch_with_cache(ResourceKind::WorkOrders.key(customer_id), move || async move {
                backend.work_orders(customer_id, None).await.map(Arc::new)
            })
            .await
    }

    pub async fn work_orders_with_status(
        &self,
        customer_id: u64,
        status: WorkOrderStatus,
    ) -> Result<Arc<Vec<WorkOrder>>, BackendError> {
        let key = ResourceKind::WorkOrders.query_key(customer_id, &[("status", status.as_ref())]);
        let backend = Arc::clone(&self.backend);
        self.work_orders
            .fetch_with_cache(key, move || async move {
                backend
                    .work_orders(customer_id, Some(status))
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// Load the customer, their vehicles and work orders concurrently
    pub async fn details(&self, customer_id: u64) -> Result<CustomerDetails, BackendError> {
        let (customer, vehicles, work_orders) = futures::try_join!(
            self.customer(customer_id),
            self.vehicles(customer_id),
            self.work_orders(customer_id),
        )?;
        let summary = WorkOrderSummary::from_orders(&work_orders);

        Ok(CustomerDetails {
            customer,
            vehicles,
            work_orders,
            summary,
        })
    }

    pub async fn update_customer(&self, customer: Customer) -> Result<Arc<Customer>, BackendError> {
        let updated = self.backend.update_customer(customer).await?;
        self.customers.invalidate(&ResourceKind::Customer.key(updated.id));
        log::debug!("Customer {} updated", updated.id);
        Ok(Arc::new(updated))
    }

    /// Record a new or changed work order and forget every cached list it may appear in
    pub async fn record_work_order(&self, order: WorkOrder) -> Result<WorkOrder, BackendError> {
        let recorded = self.backend.record_work_order(order).await?;
        let customer_id = recorded.customer_id;
        self.work_orders
            .invalidate_matching(|key| ResourceKind::WorkOrders.owns_key(customer_id, key));
        log::debug!(
            "Work order {} recorded for customer {}",
            recorded.id,
            customer_id
        );
        Ok(recorded)
    }

    /// Forget everything cached about one customer
    pub fn invalidate_customer(&self, customer_id: u64) {
        self.customers
            .invalidate(&ResourceKind::Customer.key(customer_id));
        self.vehicles
            .invalidate(&ResourceKind::Vehicles.key(customer_id));
        self.work_orders
            .invalidate_matching(|key| ResourceKind::WorkOrders.owns_key(customer_id, key));
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            customers: self.customers.stats(),
            vehicles: self.vehicles.stats(),
            work_orders: self.work_orders.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::fixture;
    use crate::backend::{CallCounts, InMemoryBackend};
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn loader_with_latency(latency_ms: u64) -> (Arc<InMemoryBackend>, CustomerDetailsLoader) {
        let backend = Arc::new(
            InMemoryBackend::new(fixture()).with_latency(StdDuration::from_millis(latency_ms)),
        );
        let loader = CustomerDetailsLoader::new(
            backend.clone(),
            CacheConfig::new(Duration::milliseconds(30_000)),
        );
        (backend, loader)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_details_share_backend_calls() {
        let (backend, loader) = loader_with_latency(200);

        let (a, b) = futures::join!(loader.details(42), loader.details(42));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a.customer, &b.customer));
        assert!(Arc::ptr_eq(&a.work_orders, &b.work_orders));
        assert_eq!(a.customer.name, "Alice");
        assert_eq!(a.summary.total, 3);
        assert_eq!(
            backend.calls(),
            CallCounts {
                customer: 1,
                vehicles: 1,
                work_orders: 1
            }
        );

        let stats = loader.stats();
        assert_eq!(stats.customers.coalesced, 1);
        assert_eq!(stats.work_orders.fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_reads_expire_after_ttl() {
        let (backend, loader) = loader_with_latency(50);

        loader.customer(42).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(1_000)).await;
        loader.customer(42).await.unwrap();
        assert_eq!(backend.calls().customer, 1);

        tokio::time::sleep(StdDuration::from_millis(30_000)).await;
        loader.customer(42).await.unwrap();
        assert_eq!(backend.calls().customer, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_customer_invalidates_cached_record() {
        let (backend, loader) = loader_with_latency(10);

        let before = loader.customer(42).await.unwrap();
        let mut changed = (*before).clone();
        changed.name = "Alice Smith".to_string();
        loader.update_customer(changed).await.unwrap();

        let after = loader.customer(42).await.unwrap();
        assert_eq!(after.name, "Alice Smith");
        assert_eq!(backend.calls().customer, 2);

        // The other customer stayed cached
        loader.customer(7).await.unwrap();
        loader.customer(7).await.unwrap();
        assert_eq!(backend.calls().customer, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_work_order_invalidates_all_lists_for_customer() {
        let (backend, loader) = loader_with_latency(10);

        let pending = loader
            .work_orders_with_status(42, WorkOrderStatus::Pending)
            .await
            .unwrap();
        loader.work_orders(42).await.unwrap();
        loader.work_orders(7).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(backend.calls().work_orders, 3);

        let mut order = pending[0].clone();
        order.status = WorkOrderStatus::Completed;
        loader.record_work_order(order).await.unwrap();

        let pending = loader
            .work_orders_with_status(42, WorkOrderStatus::Pending)
            .await
            .unwrap();
        assert!(pending.is_empty());
        let all = loader.work_orders(42).await.unwrap();
        assert_eq!(all.iter().filter(|o| o.status == WorkOrderStatus::Completed).count(), 3);
        loader.work_orders(7).await.unwrap();

        assert_eq!(backend.calls().work_orders, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_is_retried() {
        let (backend, loader) = loader_with_latency(10);

        backend.set_unavailable(true);
        let (a, b) = futures::join!(loader.vehicles(42), loader.vehicles(42));
        assert!(matches!(a, Err(BackendError::Unavailable(_))));
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(backend.calls().vehicles, 1);

        backend.set_unavailable(false);
        assert_eq!(loader.vehicles(42).await.unwrap().len(), 1);
        assert_eq!(backend.calls().vehicles, 2);
        assert_eq!(loader.stats().vehicles.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_customer_fails_details() {
        let (_backend, loader) = loader_with_latency(0);

        let err = loader.details(1).await.unwrap_err();
        assert_eq!(
            err,
            BackendError::NotFound {
                resource: ResourceKind::Customer,
                id: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_customer_clears_every_resource() {
        let (backend, loader) = loader_with_latency(0);

        loader.details(42).await.unwrap();
        loader.invalidate_customer(42);
        loader.details(42).await.unwrap();

        assert_eq!(
            backend.calls(),
            CallCounts {
                customer: 2,
                vehicles: 2,
                work_orders: 2
            }
        );
    }
}
