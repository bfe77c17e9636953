use crate::error::BackendError;
use crate::keys::ResourceKind;
use crate::models::{Customer, Vehicle, WorkOrder, WorkOrderStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// The hosted data store the loader reads from and writes to
#[async_trait]
pub trait Backend: Send + Sync {
    async fn customer(&self, id: u64) -> Result<Customer, BackendError>;

    async fn vehicles(&self, customer_id: u64) -> Result<Vec<Vehicle>, BackendError>;

    /// Work orders for a customer, newest first, optionally only those in `status`
    async fn work_orders(
        &self,
        customer_id: u64,
        status: Option<WorkOrderStatus>,
    ) -> Result<Vec<WorkOrder>, BackendError>;

    async fn update_customer(&self, customer: Customer) -> Result<Customer, BackendError>;

    /// Insert or replace a work order
    async fn record_work_order(&self, order: WorkOrder) -> Result<WorkOrder, BackendError>;
}

/// Seed data for [`InMemoryBackend`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub work_orders: Vec<WorkOrder>,
}

/// Number of reads served per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub customer: usize,
    pub vehicles: usize,
    pub work_orders: usize,
}

#[derive(Default)]
struct Counters {
    customer: AtomicUsize,
    vehicles: AtomicUsize,
    work_orders: AtomicUsize,
}

/// Backend holding everything in memory, with optional simulated latency
#[derive(Default)]
pub struct InMemoryBackend {
    data: RwLock<Fixture>,
    latency: Option<Duration>,
    unavailable: AtomicBool,
    calls: Counters,
}

impl InMemoryBackend {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            data: RwLock::new(fixture),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_json::from_str(&raw)?;
        log::info!(
            "Loaded {} customers, {} vehicles, {} work orders from {}",
            fixture.customers.len(),
            fixture.vehicles.len(),
            fixture.work_orders.len(),
            path.display()
        );
        Ok(Self::new(fixture))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every call fail with [`BackendError::Unavailable`] until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            customer: self.calls.customer.load(Ordering::SeqCst),
            vehicles: self.calls.vehicles.load(Ordering::SeqCst),
            work_orders: self.calls.work_orders.load(Ordering::SeqCst),
        }
    }

    async fn round_trip(&self) -> Result<(), BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn customer(&self, id: u64) -> Result<Customer, BackendError> {
        self.calls.customer.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        log::debug!("Backend read customer {}", id);

        self.data
            .read()
            .await
            .customers
            .iter()
            .find(|customer| customer.id == id)
            .cloned()
            .ok_or(BackendError::NotFound {
                resource: ResourceKind::Customer,
                id,
            })
    }

    async fn vehicles(&self, customer_id: u64) -> Result<Vec<Vehicle>, BackendError> {
        self.calls.vehicles.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        Ok(self
            .data
            .read()
            .await
            .vehicles
            .iter()
            .filter(|vehicle| vehicle.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn work_orders(
        &self,
        customer_id: u64,
        status: Option<WorkOrderStatus>,
    ) -> Result<Vec<WorkOrder>, BackendError> {
        self.calls.work_orders.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let mut orders: Vec<_> = self
            .data
            .read()
            .await
            .work_orders
            .iter()
            .filter(|order| order.customer_id == customer_id)
            .filter(|order| status.map_or(true, |status| order.status == status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_customer(&self, customer: Customer) -> Result<Customer, BackendError> {
        self.round_trip().await?;

        let mut data = self.data.write().await;
        let stored = data
            .customers
            .iter_mut()
            .find(|stored| stored.id == customer.id)
            .ok_or(BackendError::NotFound {
                resource: ResourceKind::Customer,
                id: customer.id,
            })?;
        *stored = customer.clone();
        Ok(customer)
    }

    async fn record_work_order(&self, order: WorkOrder) -> Result<WorkOrder, BackendError> {
        self.round_trip().await?;

        let mut data = self.data.write().await;
        if !data.customers.iter().any(|c| c.id == order.customer_id) {
            return Err(BackendError::NotFound {
                resource: ResourceKind::Customer,
                id: order.customer_id,
            });
        }
        match data.work_orders.iter().position(|stored| stored.id == order.id) {
            Some(index) => data.work_orders[index] = order.clone(),
            None => data.work_orders.push(order.clone()),
        }
        Ok(order)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Vertical;
    use chrono::{TimeZone, Utc};

    pub(crate) fn fixture() -> Fixture {
        let customer = |id, name: &str, vertical| Customer {
            id,
            name: name.to_string(),
            email: None,
            phone: None,
            vertical,
        };
        let order = |id, customer_id, status, total_cents, day| WorkOrder {
            id,
            customer_id,
            vehicle_id: None,
            status,
            description: format!("order {}", id),
            total_cents,
            created_at: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
        };

        Fixture {
            customers: vec![
                customer(42, "Alice", Vertical::Automotive),
                customer(7, "Bob", Vertical::Marine),
            ],
            vehicles: vec![Vehicle {
                id: 1,
                customer_id: 42,
                description: "2012 Honda Civic".to_string(),
                vin: Some("2HGFB2F59CH123456".to_string()),
            }],
            work_orders: vec![
                order(100, 42, WorkOrderStatus::Completed, 25_000, 1),
                order(101, 42, WorkOrderStatus::Pending, 8_000, 5),
                order(102, 42, WorkOrderStatus::Completed, 15_000, 3),
                order(200, 7, WorkOrderStatus::InProgress, 99_000, 2),
            ],
        }
    }

    #[tokio::test]
    async fn test_reads_filter_by_customer() {
        let backend = InMemoryBackend::new(fixture());

        assert_eq!(backend.customer(42).await.unwrap().name, "Alice");
        assert_eq!(backend.vehicles(42).await.unwrap().len(), 1);
        assert!(backend.vehicles(7).await.unwrap().is_empty());

        let orders = backend.work_orders(42, None).await.unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![101, 102, 100]);

        let completed = backend
            .work_orders(42, Some(WorkOrderStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 2);

        assert_eq!(
            backend.calls(),
            CallCounts {
                customer: 1,
                vehicles: 2,
                work_orders: 2
            }
        );
    }

    #[tokio::test]
    async fn test_missing_customer() {
        let backend = InMemoryBackend::new(fixture());
        let err = backend.customer(1).await.unwrap_err();
        assert_eq!(
            err,
            BackendError::NotFound {
                resource: ResourceKind::Customer,
                id: 1
            }
        );
        assert_eq!(err.to_string(), "customer 1 not found");
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_every_call() {
        let backend = InMemoryBackend::new(fixture());
        backend.set_unavailable(true);
        assert!(matches!(
            backend.vehicles(42).await,
            Err(BackendError::Unavailable(_))
        ));

        backend.set_unavailable(false);
        assert!(backend.vehicles(42).await.is_ok());
    }

    #[tokio::test]
    async fn test_writes_are_visible_to_reads() {
        let backend = InMemoryBackend::new(fixture());

        let mut alice = backend.customer(42).await.unwrap();
        alice.phone = Some("555-0100".to_string());
        backend.update_customer(alice).await.unwrap();
        assert_eq!(
            backend.customer(42).await.unwrap().phone.as_deref(),
            Some("555-0100")
        );

        let mut order = backend.work_orders(42, None).await.unwrap()[0].clone();
        order.status = WorkOrderStatus::Completed;
        backend.record_work_order(order).await.unwrap();
        assert_eq!(
            backend
                .work_orders(42, Some(WorkOrderStatus::Pending))
                .await
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_fixture_file_round_trip() {
        let dir = tempdir::TempDir::new("customer-loader").unwrap();
        let path = dir.path().join("fixtures.json");
        std::fs::write(&path, serde_json::to_string(&fixture()).unwrap()).unwrap();

        let backend = InMemoryBackend::from_file(&path).unwrap();
        assert_eq!(backend.calls(), CallCounts::default());
        assert!(InMemoryBackend::from_file(dir.path().join("missing.json")).is_err());
    }
}
