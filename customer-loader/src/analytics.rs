use crate::models::{WorkOrder, WorkOrderStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate figures over a customer's work orders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkOrderSummary {
    pub total: usize,
    pub by_status: BTreeMap<WorkOrderStatus, usize>,
    /// Pending or in progress
    pub open: usize,
    pub completed_revenue_cents: i64,
    pub average_completed_cents: Option<i64>,
    pub latest_order_at: Option<DateTime<Utc>>,
}

impl WorkOrderSummary {
    pub fn from_orders(orders: &[WorkOrder]) -> Self {
        let mut summary = WorkOrderSummary {
            total: orders.len(),
            ..Default::default()
        };
        let mut completed = 0i64;

        for order in orders {
            *summary.by_status.entry(order.status).or_default() += 1;

            if order.status.is_open() {
                summary.open += 1;
            }
            if order.status == WorkOrderStatus::Completed {
                completed += 1;
                summary.completed_revenue_cents += order.total_cents;
            }
            if summary
                .latest_order_at
                .map_or(true, |latest| order.created_at > latest)
            {
                summary.latest_order_at = Some(order.created_at);
            }
        }

        if completed > 0 {
            summary.average_completed_cents = Some(summary.completed_revenue_cents / completed);
        }

        summary
    }
}
