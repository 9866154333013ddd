//! Partner resolution: one secondary lookup per referenced partner.

use crate::errors::AppError;
use crate::models::PartnerDetails;
use crate::odoo_client::{OdooClient, OdooSession};
use crate::request_builder::{FilterOp, QueryRequest};
use crate::xmlrpc::Value;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;

pub const PARTNER_MODEL: &str = "res.partner";
pub const UEN_FIELD: &str = "l10n_sg_unique_entity_number";

/// Resolves a partner id into contact details. Never fails.
#[async_trait]
pub trait PartnerResolver: Send + Sync {
    async fn resolve(&self, partner_id: i64) -> PartnerDetails;
}

/// Looks partners up in the ERP with the session of the current ingestion.
pub struct OdooPartnerResolver {
    client: Arc<OdooClient>,
    session: OdooSession,
}

impl OdooPartnerResolver {
    pub fn new(client: Arc<OdooClient>, session: OdooSession) -> Self {
        Self { client, session }
    }

    async fn lookup(&self, partner_id: i64, fields: &[&str]) -> Result<Option<Value>, AppError> {
        let query = QueryRequest::new(PARTNER_MODEL)
            .filter("id", FilterOp::Eq, partner_id)
            .fields(fields.iter().copied());
        let rows = self.client.search_read_rows(&self.session, &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn try_resolve(&self, partner_id: i64) -> Result<PartnerDetails, AppError> {
        let Some(row) = self
            .lookup(partner_id, &["email", "phone", "parent_id", UEN_FIELD])
            .await?
        else {
            tracing::warn!("Partner {} not found in ERP", partner_id);
            return Ok(PartnerDetails::empty(partner_id));
        };

        let parent_id = row.member("parent_id").and_then(Value::first_int);
        let mut details = PartnerDetails {
            email: string_member(&row, "email"),
            phone: string_member(&row, "phone"),
            uen: string_member(&row, UEN_FIELD),
            company_id: parent_id.unwrap_or(partner_id),
        };

        if details.uen.is_empty() {
            if let Some(parent_id) = parent_id {
                details.uen = self.parent_uen(partner_id, parent_id).await;
            }
        }

        Ok(details)
    }

    /// UEN of the parent company. Failures leave the UEN empty but keep the
    /// parent as the company.
    async fn parent_uen(&self, partner_id: i64, parent_id: i64) -> String {
        match self.lookup(parent_id, &[UEN_FIELD]).await {
            Ok(Some(row)) => string_member(&row, UEN_FIELD),
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(
                    "Parent UEN lookup failed for partner {} (parent {}): {}",
                    partner_id,
                    parent_id,
                    e
                );
                String::new()
            }
        }
    }
}

/// A direct string value, or empty when the ERP sent `false`/nothing.
fn string_member(row: &Value, name: &str) -> String {
    match row.member(name) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

#[async_trait]
impl PartnerResolver for OdooPartnerResolver {
    async fn resolve(&self, partner_id: i64) -> PartnerDetails {
        match self.try_resolve(partner_id).await {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!("Partner {} lookup failed, enrichment left empty: {}", partner_id, e);
                PartnerDetails::empty(partner_id)
            }
        }
    }
}

/// Deduplicates lookups of the same partner within one ingestion call.
///
/// Concurrent requests for an id share a single in-flight lookup.
pub struct MemoizedResolver<R> {
    inner: R,
    cache: Cache<i64, PartnerDetails>,
}

impl<R: PartnerResolver> MemoizedResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(10_000).build(),
        }
    }
}

#[async_trait]
impl<R: PartnerResolver> PartnerResolver for MemoizedResolver<R> {
    async fn resolve(&self, partner_id: i64) -> PartnerDetails {
        self.cache
            .get_with(partner_id, self.inner.resolve(partner_id))
            .await
    }
}
