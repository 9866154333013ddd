//! Sale order ingestion: authenticate, query a month, normalize, enrich.

use crate::errors::{AppError, ResultExt};
use crate::models::NormalizedRecord;
use crate::normalizer::ResponseNormalizer;
use crate::odoo_client::{OdooClient, OdooSession};
use crate::request_builder::{FilterOp, QueryRequest};
use crate::resolver::{MemoizedResolver, OdooPartnerResolver, PartnerResolver};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::{Arc, OnceLock};

pub const SALE_ORDER_MODEL: &str = "sale.order";

/// Fields requested for every sale order, in request order.
pub const SALE_ORDER_FIELDS: [&str; 13] = [
    "name",
    "date_order",
    "partner_id",
    "amount_total",
    "state",
    "x_studio_existing_subs_from_chargebee",
    "x_studio_cb_subscription_id",
    "company_id",
    "user_id",
    "x_studio_related_field_2qf_1iprtjf43",
    "x_studio_related_field_9ma_1ipqq874u",
    "id",
    "create_date",
];

fn month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("month pattern is valid"))
}

/// First and last day of a `YYYY-MM` month, formatted `YYYY-MM-DD`.
pub fn month_range(month: &str) -> Result<(String, String), AppError> {
    let invalid = || AppError::BadRequest(format!("month must be YYYY-MM, got '{}'", month));

    let caps = month_pattern().captures(month.trim()).ok_or_else(invalid)?;
    let year: i32 = caps[1].parse().map_err(|_| invalid())?;
    let month_num: u32 = caps[2].parse().map_err(|_| invalid())?;

    let start = NaiveDate::from_ymd_opt(year, month_num, 1).ok_or_else(invalid)?;
    let next_month = if month_num == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month_num + 1, 1)
    }
    .ok_or_else(invalid)?;
    let end = next_month.pred_opt().ok_or_else(invalid)?;

    debug_assert_eq!(end.month(), start.month());
    Ok((
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    ))
}

/// Sale orders created between `start` and `end`, both inclusive, newest
/// order date first.
pub fn sale_order_query(start: &str, end: &str) -> QueryRequest {
    QueryRequest::new(SALE_ORDER_MODEL)
        .filter("create_date", FilterOp::Gte, start)
        .filter("create_date", FilterOp::Lte, end)
        .fields(SALE_ORDER_FIELDS)
        .order("date_order desc")
}

/// Runs one ingestion per call. Holds no per-call state itself.
pub struct SaleOrderIngestion {
    client: Arc<OdooClient>,
    memoize_partners: bool,
}

impl SaleOrderIngestion {
    pub fn new(client: Arc<OdooClient>, memoize_partners: bool) -> Self {
        Self {
            client,
            memoize_partners,
        }
    }

    pub fn client(&self) -> &Arc<OdooClient> {
        &self.client
    }

    /// Runs `query` and returns normalized, enriched records in response order.
    pub async fn ingest(
        &self,
        session: &OdooSession,
        query: &QueryRequest,
    ) -> Result<Vec<NormalizedRecord>, AppError> {
        let raw = self
            .client
            .search_read(session, query)
            .await
            .with_context(|| format!("search_read {}", query.entity_name))?;
        tracing::debug!("Raw {} response: {} bytes", query.entity_name, raw.len());

        if self.client.debug_dump().is_enabled() {
            self.client.debug_dump().write("sale-orders-response", &raw).await;
        }

        let partners = OdooPartnerResolver::new(self.client.clone(), *session);
        let resolver: Box<dyn PartnerResolver> = if self.memoize_partners {
            Box::new(MemoizedResolver::new(partners))
        } else {
            Box::new(partners)
        };

        ResponseNormalizer::new(resolver.as_ref())
            .normalize(&raw)
            .await
            .with_context(|| format!("normalizing {} response", query.entity_name))
    }

    /// Authenticates and ingests all sale orders created in `month` (`YYYY-MM`).
    pub async fn fetch_month(&self, month: &str) -> Result<Vec<NormalizedRecord>, AppError> {
        let (start, end) = month_range(month)?;
        tracing::info!("Fetching sale orders for {} ({} to {})", month, start, end);

        let session = self
            .client
            .authenticate()
            .await
            .context("authenticating with ERP")?;

        match self.ingest(&session, &sale_order_query(&start, &end)).await {
            Ok(records) => {
                tracing::info!("Ingested {} sale order(s) for {}", records.len(), month);
                Ok(records)
            }
            Err(e) => {
                tracing::error!("Sale order ingestion for {} failed: {}", month, e);
                Err(e)
            }
        }
    }
}
