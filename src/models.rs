use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ ERP Models ============

/// A foreign-key style pointer to another ERP record, serialized as `[id, name]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i64, String)", into = "(i64, String)")]
pub struct Reference {
    pub id: i64,
    pub name: String,
}

impl Reference {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl From<(i64, String)> for Reference {
    fn from((id, name): (i64, String)) -> Self {
        Self { id, name }
    }
}

impl From<Reference> for (i64, String) {
    fn from(r: Reference) -> Self {
        (r.id, r.name)
    }
}

/// Value of `payment_status` for a paid order. Anything else is unpaid.
pub const PAID: &str = "Paid";

/// One sale order after parsing and partner enrichment.
///
/// Serialized with the ERP's field names so downstream consumers see the
/// same keys the ERP uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: Option<i64>,
    /// Order reference code, e.g. `S00219`.
    pub so: Option<String>,
    pub date_order: Option<String>,
    pub create_date: Option<String>,
    /// Carries the partner's company id (parent when present), not the contact id.
    pub partner_id: Option<Reference>,
    pub amount_total: Option<f64>,
    pub state: Option<String>,
    pub user_id: Option<Reference>,
    pub company_id: Option<Reference>,
    #[serde(rename = "x_studio_cb_subscription_id")]
    pub subscription_id: Option<String>,
    /// Renewal flag: `"Yes"` when the order renews an existing subscription.
    #[serde(rename = "x_studio_existing_subs_from_chargebee")]
    pub existing_subscription: Option<String>,
    /// ERP-side payment state; the literal `"paid"` marks the order paid.
    #[serde(rename = "x_studio_related_field_2qf_1iprtjf43")]
    pub payment_reference: Option<String>,
    #[serde(rename = "x_studio_related_field_9ma_1ipqq874u")]
    pub invoice_reference: Option<String>,
    /// `"Paid"` or empty.
    pub payment_status: String,
    pub email: String,
    pub uen: String,
    pub phone: String,
}

impl NormalizedRecord {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PAID
    }
}

/// Contact attributes copied from a resolved partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerDetails {
    pub email: String,
    pub phone: String,
    pub uen: String,
    pub company_id: i64,
}

impl PartnerDetails {
    /// What a failed lookup degrades to.
    pub fn empty(partner_id: i64) -> Self {
        Self {
            email: String::new(),
            phone: String::new(),
            uen: String::new(),
            company_id: partner_id,
        }
    }
}

// ============ Follow-up Models ============

/// A follow-up note recorded against a sale.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: Uuid,
    pub sale_id: String,
    pub channels: Vec<String>,
    pub notes: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFollowUp {
    pub sale_id: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowUpUpdate {
    pub channels: Option<Vec<String>>,
    pub notes: Option<String>,
}

// ============ API Models ============

/// A sale order as shown on the dashboard: the ERP record plus follow-up state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRow {
    #[serde(flatten)]
    pub record: NormalizedRecord,
    #[serde(rename = "followUpChannels")]
    pub follow_up_channels: Vec<String>,
    #[serde(rename = "followUpNotes")]
    pub follow_up_notes: String,
    #[serde(rename = "followUpCount")]
    pub follow_up_count: usize,
    #[serde(rename = "lastFollowUpDate")]
    pub last_follow_up_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaleReferenceQuery {
    pub so: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpListQuery {
    pub sale_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub so: String,
    pub paid: bool,
}

// ============ Renewal Collection Models ============

/// Cumulative collection totals. Each vector has one entry per reported
/// week, most recent week first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTotals {
    pub total_paid: Vec<f64>,
    pub total_unpaid: Vec<f64>,
    pub renewal_paid: Vec<f64>,
    pub renewal_unpaid: Vec<f64>,
    pub new_lead_paid: Vec<f64>,
    pub new_lead_unpaid: Vec<f64>,
}

impl CollectionTotals {
    pub fn zeroed(weeks: usize) -> Self {
        Self {
            total_paid: vec![0.0; weeks],
            total_unpaid: vec![0.0; weeks],
            renewal_paid: vec![0.0; weeks],
            renewal_unpaid: vec![0.0; weeks],
            new_lead_paid: vec![0.0; weeks],
            new_lead_unpaid: vec![0.0; weeks],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportWeek {
    /// Last day of the week, `YYYY-MM-DD`.
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenewalCollectionReport {
    pub data: CollectionTotals,
    pub weeks: Vec<ReportWeek>,
}
