//! Dashboard rows: ERP records joined with follow-ups and processor payments.

use crate::errors::AppError;
use crate::follow_ups::FollowUpStore;
use crate::models::{DashboardRow, FollowUp, NormalizedRecord, PAID};
use crate::payments::PaymentStatusLookup;
use std::collections::HashMap;

/// Joins records with their follow-ups. `follow_ups` may be in any order.
pub fn merge_follow_ups(records: Vec<NormalizedRecord>, follow_ups: Vec<FollowUp>) -> Vec<DashboardRow> {
    let mut by_sale: HashMap<String, Vec<FollowUp>> = HashMap::new();
    for follow_up in follow_ups {
        by_sale
            .entry(follow_up.sale_id.clone())
            .or_default()
            .push(follow_up);
    }
    for entries in by_sale.values_mut() {
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    records
        .into_iter()
        .map(|record| {
            let entries = sale_key(&record)
                .and_then(|key| by_sale.get(&key))
                .map(Vec::as_slice)
                .unwrap_or_default();
            let latest = entries.first();

            DashboardRow {
                follow_up_channels: latest.map(|f| f.channels.clone()).unwrap_or_default(),
                follow_up_notes: latest.map(|f| f.notes.clone()).unwrap_or_default(),
                follow_up_count: entries.len(),
                last_follow_up_date: latest.map(|f| f.created_at),
                record,
            }
        })
        .collect()
}

/// Follow-ups are keyed on the ERP record id.
fn sale_key(record: &NormalizedRecord) -> Option<String> {
    record.id.map(|id| id.to_string())
}

/// Marks records paid when the processor reports a successful payment.
///
/// Records the ERP already marks paid are left alone. Lookup failures are
/// logged and the record stays unpaid.
pub async fn apply_processor_payments(
    records: &mut [NormalizedRecord],
    payments: &dyn PaymentStatusLookup,
) {
    for record in records.iter_mut().filter(|r| !r.is_paid()) {
        let Some(reference) = record.so.as_deref() else {
            continue;
        };

        match payments.find_payment_by_sale_reference(reference).await {
            Ok(true) => {
                tracing::debug!("Processor reports {} paid", reference);
                record.payment_status = PAID.to_string();
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Payment lookup for {} failed: {}", reference, e);
            }
        }
    }
}

/// Builds the dashboard for already-ingested records.
pub async fn build_dashboard(
    mut records: Vec<NormalizedRecord>,
    follow_ups: &dyn FollowUpStore,
    payments: &dyn PaymentStatusLookup,
) -> Result<Vec<DashboardRow>, AppError> {
    apply_processor_payments(&mut records, payments).await;

    let sale_ids: Vec<String> = records.iter().filter_map(sale_key).collect();
    let entries = follow_ups.get_follow_ups_for_sales(&sale_ids).await?;

    Ok(merge_follow_ups(records, entries))
}
