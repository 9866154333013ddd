//! Renewal collection report.
//!
//! Sums what has been collected against sale orders placed since the start
//! of collections tracking, cumulatively at the end of each of the last four
//! completed weeks, split into renewals and new leads.

use crate::errors::{AppError, ResultExt};
use crate::ingestion::SALE_ORDER_MODEL;
use crate::models::{CollectionTotals, RenewalCollectionReport, ReportWeek};
use crate::odoo_client::OdooClient;
use crate::request_builder::{FilterOp, QueryRequest};
use crate::xmlrpc::Value;
use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub const PAYMENT_MODEL: &str = "account.payment";

/// Many2one on `account.payment` pointing at the paid sale order.
pub const PAYMENT_ORDER_FIELD: &str = "x_studio_related_field_2p3_1iptocq6m";

pub const EXISTING_SUBSCRIPTION_FIELD: &str = "x_studio_existing_subs_from_chargebee";

pub const REPORTED_WEEKS: usize = 4;

pub const ORDER_FIELDS: [&str; 5] = [
    "id",
    "amount_total",
    "date_order",
    EXISTING_SUBSCRIPTION_FIELD,
    "name",
];

pub const PAYMENT_FIELDS: [&str; 5] = [
    "id",
    "amount",
    "date",
    PAYMENT_ORDER_FIELD,
    "x_studio_payment_state_1",
];

/// First order date counted by the report.
pub fn collection_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 28).expect("collection start is a valid date")
}

/// A seven-day window, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Week {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// The last `count` weeks before `today`, most recent first. The current
/// week is never included.
pub fn reported_weeks(today: NaiveDate, count: usize) -> Vec<Week> {
    (1..=count as i64)
        .map(|i| {
            let start = today - Duration::days(7 * i);
            Week {
                start,
                end: start + Duration::days(6),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOrder {
    pub id: i64,
    pub amount_total: f64,
    pub order_date: Option<NaiveDate>,
    pub renewal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPayment {
    /// Number parsed from the linked order's `S<digits>` reference.
    pub order_number: Option<i64>,
    pub amount: f64,
}

fn order_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"S(\d+)").expect("order number pattern is valid"))
}

/// `"S00219"` gives 219. References without an `S<digits>` run give `None`.
pub fn order_number(reference: &str) -> Option<i64> {
    order_number_pattern()
        .captures(reference)
        .and_then(|caps| caps[1].parse().ok())
        .filter(|n| *n > 0)
}

fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Double(d)) => *d,
        Some(Value::Int(i)) => *i as f64,
        _ => 0.0,
    }
}

/// Odoo datetimes look like `2025-03-04 10:00:00`; only the date is kept.
fn date_prefix(value: Option<&Value>) -> Option<NaiveDate> {
    let raw = value?.first_string()?;
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

impl CollectionOrder {
    /// Rows without an integer id are skipped.
    pub fn from_row(row: &Value) -> Option<Self> {
        let id = match row.member("id") {
            Some(Value::Int(id)) => *id,
            _ => return None,
        };
        Some(Self {
            id,
            amount_total: number(row.member("amount_total")),
            order_date: date_prefix(row.member("date_order")),
            renewal: matches!(
                row.member(EXISTING_SUBSCRIPTION_FIELD),
                Some(Value::String(s)) if s == "Yes"
            ),
        })
    }
}

impl CollectionPayment {
    /// The order link is either a bare reference or an `[id, "S00219"]` pair.
    pub fn from_row(row: &Value) -> Self {
        Self {
            order_number: row
                .member(PAYMENT_ORDER_FIELD)
                .and_then(Value::first_string)
                .and_then(order_number),
            amount: number(row.member("amount")),
        }
    }
}

/// Orders dated from `start` up to the end of the most recent reported week.
pub fn order_query(start: NaiveDate, end: NaiveDate) -> QueryRequest {
    QueryRequest::new(SALE_ORDER_MODEL)
        .filter("date_order", FilterOp::Gte, start.format("%Y-%m-%d").to_string())
        .filter("date_order", FilterOp::Lte, end.format("%Y-%m-%d").to_string())
        .fields(ORDER_FIELDS)
}

/// Posted payments linked to any of `order_ids`.
pub fn payment_query(order_ids: &[i64]) -> QueryRequest {
    QueryRequest::new(PAYMENT_MODEL)
        .filter(
            PAYMENT_ORDER_FIELD,
            FilterOp::In,
            order_ids.iter().map(|id| Value::Int(*id)).collect::<Vec<_>>(),
        )
        .filter("state", FilterOp::NotEq, "draft")
        .fields(PAYMENT_FIELDS)
}

/// Cumulative paid and unpaid totals at the end of each week.
///
/// Payments are matched to orders by the number in the order reference. An
/// order counts as unpaid only for the part not yet collected, never below
/// zero. Orders without a readable date count in every week.
pub fn aggregate(
    orders: &[CollectionOrder],
    payments: &[CollectionPayment],
    weeks: &[Week],
) -> CollectionTotals {
    let mut paid_by_order: HashMap<i64, f64> = HashMap::new();
    for payment in payments {
        if let Some(number) = payment.order_number {
            *paid_by_order.entry(number).or_default() += payment.amount;
        }
    }

    let mut totals = CollectionTotals::zeroed(weeks.len());
    for (index, week) in weeks.iter().enumerate() {
        for order in orders {
            if order.order_date.is_some_and(|date| date > week.end) {
                continue;
            }

            let paid = paid_by_order.get(&order.id).copied().unwrap_or(0.0);
            let unpaid = (order.amount_total - paid).max(0.0);

            totals.total_paid[index] += paid;
            totals.total_unpaid[index] += unpaid;
            if order.renewal {
                totals.renewal_paid[index] += paid;
                totals.renewal_unpaid[index] += unpaid;
            } else {
                totals.new_lead_paid[index] += paid;
                totals.new_lead_unpaid[index] += unpaid;
            }
        }
    }

    totals
}

/// Builds the report from the ERP. One authentication, at most two queries.
pub struct RenewalCollection {
    client: Arc<OdooClient>,
}

impl RenewalCollection {
    pub fn new(client: Arc<OdooClient>) -> Self {
        Self { client }
    }

    pub async fn report(&self, today: NaiveDate) -> Result<RenewalCollectionReport, AppError> {
        let weeks = reported_weeks(today, REPORTED_WEEKS);
        let last_day = weeks.first().map(|w| w.end).unwrap_or(today);

        let session = self
            .client
            .authenticate()
            .await
            .context("authenticating with ERP")?;

        let orders: Vec<CollectionOrder> = self
            .client
            .search_read_rows(&session, &order_query(collection_start(), last_day))
            .await
            .context("fetching orders for renewal collection")?
            .iter()
            .filter_map(CollectionOrder::from_row)
            .collect();

        let payments: Vec<CollectionPayment> = if orders.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
            self.client
                .search_read_rows(&session, &payment_query(&ids))
                .await
                .context("fetching payments for renewal collection")?
                .iter()
                .map(CollectionPayment::from_row)
                .collect()
        };

        tracing::info!(
            orders = orders.len(),
            payments = payments.len(),
            through = %last_day,
            "Computed renewal collection totals"
        );

        Ok(RenewalCollectionReport {
            data: aggregate(&orders, &payments, &weeks),
            weeks: weeks
                .iter()
                .map(|w| ReportWeek {
                    end: w.end.format("%Y-%m-%d").to_string(),
                })
                .collect(),
        })
    }
}
