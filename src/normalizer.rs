//! Turns a `search_read` response on `sale.order` into [`NormalizedRecord`]s.
//!
//! The parsed value tree is flattened into a stream of scan events and fed
//! through a small state machine (`Idle` → `InRecord` → `InField`). Elements of
//! an array-valued field arrive as separate value events, so a reference's id
//! and display name are applied one after the other, in wire order.
//!
//! Partner resolution is the one suspension point: when a partner id is seen
//! the scan awaits the resolver before looking at the next event. Records are
//! processed strictly in order, one lookup at a time.

use crate::errors::AppError;
use crate::models::{NormalizedRecord, Reference, PAID};
use crate::odoo_client::rows_from_params;
use crate::resolver::PartnerResolver;
use crate::xmlrpc::{parse_response, Value};

/// ERP value of the payment reference field for a settled order.
pub const ERP_PAID_MARKER: &str = "paid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Id,
    So,
    DateOrder,
    CreateDate,
    Partner,
    AmountTotal,
    State,
    User,
    Company,
    SubscriptionId,
    ExistingSubscription,
    PaymentReference,
    InvoiceReference,
}

/// How a field's value is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Integer,
    Text,
    Float,
    /// `(id, name)` pair whose id is resolved to a company and enriches the record.
    ResolvedReference,
    /// `(id, name)` pair taken as-is.
    Reference,
}

impl Slot {
    fn for_field(name: &str) -> Option<Slot> {
        Some(match name {
            "id" => Slot::Id,
            "name" => Slot::So,
            "date_order" => Slot::DateOrder,
            "create_date" => Slot::CreateDate,
            "partner_id" => Slot::Partner,
            "amount_total" => Slot::AmountTotal,
            "state" => Slot::State,
            "user_id" => Slot::User,
            "company_id" => Slot::Company,
            "x_studio_cb_subscription_id" => Slot::SubscriptionId,
            "x_studio_existing_subs_from_chargebee" => Slot::ExistingSubscription,
            "x_studio_related_field_2qf_1iprtjf43" => Slot::PaymentReference,
            "x_studio_related_field_9ma_1ipqq874u" => Slot::InvoiceReference,
            _ => return None,
        })
    }

    fn kind(self) -> FieldKind {
        match self {
            Slot::Id => FieldKind::Integer,
            Slot::AmountTotal => FieldKind::Float,
            Slot::Partner => FieldKind::ResolvedReference,
            Slot::User | Slot::Company => FieldKind::Reference,
            _ => FieldKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanEvent<'a> {
    RecordStart,
    Field(&'a str),
    Value(&'a Value),
    RecordEnd,
}

/// Flattens `search_read` rows into scan events. Non-struct rows carry no
/// record and produce nothing.
fn scan_events(rows: &[Value]) -> Vec<ScanEvent<'_>> {
    let mut events = Vec::new();
    for row in rows {
        let Some(members) = row.as_struct() else {
            continue;
        };
        events.push(ScanEvent::RecordStart);
        for member in members {
            events.push(ScanEvent::Field(&member.name));
            match &member.value {
                Value::Array(items) => events.extend(items.iter().map(ScanEvent::Value)),
                other => events.push(ScanEvent::Value(other)),
            }
        }
        events.push(ScanEvent::RecordEnd);
    }
    events
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState<'a> {
    Idle,
    InRecord,
    InField(&'a str),
}

#[derive(Default)]
struct RecordBuilder {
    record: NormalizedRecord,
    populated: bool,
}

fn set_once<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match (slot.is_none(), value) {
        (true, Some(v)) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

impl RecordBuilder {
    fn text_slot(&mut self, slot: Slot) -> Option<&mut Option<String>> {
        let r = &mut self.record;
        Some(match slot {
            Slot::So => &mut r.so,
            Slot::DateOrder => &mut r.date_order,
            Slot::CreateDate => &mut r.create_date,
            Slot::State => &mut r.state,
            Slot::SubscriptionId => &mut r.subscription_id,
            Slot::ExistingSubscription => &mut r.existing_subscription,
            Slot::PaymentReference => &mut r.payment_reference,
            Slot::InvoiceReference => &mut r.invoice_reference,
            _ => return None,
        })
    }

    fn reference_slot(&mut self, slot: Slot) -> Option<&mut Option<Reference>> {
        let r = &mut self.record;
        match slot {
            Slot::Partner => Some(&mut r.partner_id),
            Slot::User => Some(&mut r.user_id),
            Slot::Company => Some(&mut r.company_id),
            _ => None,
        }
    }

    /// Fills the display name of an existing pair. A name with no pair yet is dropped.
    fn reference_name(&mut self, slot: Slot, field: &str, name: &str) {
        let named = match self.reference_slot(slot) {
            Some(Some(pair)) => {
                pair.name = name.to_string();
                true
            }
            _ => false,
        };
        if named {
            self.populated = true;
        } else {
            tracing::debug!("Dropping {} name '{}' that arrived before its id", field, name);
        }
    }
}

struct Scanner<'a> {
    state: ScanState<'a>,
    current: Option<RecordBuilder>,
    records: Vec<NormalizedRecord>,
}

impl<'a> Scanner<'a> {
    fn new() -> Self {
        Self {
            state: ScanState::Idle,
            current: None,
            records: Vec::new(),
        }
    }

    async fn step(&mut self, event: ScanEvent<'a>, resolver: &dyn PartnerResolver) {
        match (self.state, event) {
            (_, ScanEvent::RecordStart) => {
                self.current = Some(RecordBuilder::default());
                self.state = ScanState::InRecord;
            }
            (_, ScanEvent::RecordEnd) => {
                if let Some(builder) = self.current.take() {
                    if builder.populated {
                        self.records.push(builder.record);
                    } else {
                        tracing::debug!("Skipping sale order record with no populated fields");
                    }
                }
                self.state = ScanState::Idle;
            }
            (ScanState::Idle, _) => {}
            (_, ScanEvent::Field(name)) => self.state = ScanState::InField(name),
            (ScanState::InField(field), ScanEvent::Value(value)) => {
                if let Some(builder) = self.current.as_mut() {
                    apply(builder, field, value, resolver).await;
                }
            }
            (ScanState::InRecord, ScanEvent::Value(_)) => {}
        }
    }

    fn finish(self) -> Vec<NormalizedRecord> {
        self.records
    }
}

async fn apply(
    builder: &mut RecordBuilder,
    field: &str,
    value: &Value,
    resolver: &dyn PartnerResolver,
) {
    let Some(slot) = Slot::for_field(field) else {
        return;
    };

    match slot.kind() {
        FieldKind::Integer => {
            if set_once(&mut builder.record.id, value.first_int()) {
                builder.populated = true;
            }
        }
        FieldKind::Float => {
            if set_once(&mut builder.record.amount_total, value.first_double()) {
                builder.populated = true;
            }
        }
        FieldKind::Text => {
            let text = value.first_string().map(str::to_string);
            let assigned = builder
                .text_slot(slot)
                .map(|target| set_once(target, text))
                .unwrap_or(false);
            if assigned {
                builder.populated = true;
            }
        }
        FieldKind::ResolvedReference => match value {
            Value::Int(partner_id) => {
                let details = resolver.resolve(*partner_id).await;
                tracing::debug!(
                    partner_id = *partner_id,
                    company_id = details.company_id,
                    email = %details.email,
                    phone = %details.phone,
                    uen = %details.uen,
                    "resolved partner"
                );
                let record = &mut builder.record;
                record.partner_id = Some(Reference::new(details.company_id, ""));
                record.email = details.email;
                record.phone = details.phone;
                record.uen = details.uen;
                builder.populated = true;
            }
            Value::String(name) if !name.is_empty() => builder.reference_name(slot, field, name),
            _ => {}
        },
        FieldKind::Reference => match value {
            Value::Int(id) => {
                if let Some(target) = builder.reference_slot(slot) {
                    *target = Some(Reference::new(*id, ""));
                }
                builder.populated = true;
            }
            Value::String(name) if !name.is_empty() => builder.reference_name(slot, field, name),
            _ => {}
        },
    }
}

/// Sets `payment_status` from the ERP's payment reference field.
///
/// Exact, case-sensitive match on `"paid"`; no trimming.
pub fn apply_payment_status(records: &mut [NormalizedRecord]) {
    for record in records {
        record.payment_status = if record.payment_reference.as_deref() == Some(ERP_PAID_MARKER) {
            PAID.to_string()
        } else {
            String::new()
        };
    }
}

/// Normalizes sale order responses, enriching partners through a resolver.
pub struct ResponseNormalizer<'r> {
    resolver: &'r dyn PartnerResolver,
}

impl<'r> ResponseNormalizer<'r> {
    pub fn new(resolver: &'r dyn PartnerResolver) -> Self {
        Self { resolver }
    }

    /// Parses `raw`, scans every record and derives payment status.
    ///
    /// Faults and a missing envelope are detected before any record is
    /// scanned; partner lookup failures only empty that record's enrichment.
    pub async fn normalize(&self, raw: &str) -> Result<Vec<NormalizedRecord>, AppError> {
        let rows = rows_from_params(parse_response(raw)?)?;
        let mut records = self.normalize_rows(&rows).await;
        apply_payment_status(&mut records);

        tracing::info!("Parsed {} sale order(s) from {} row(s)", records.len(), rows.len());
        for record in &records {
            tracing::debug!(
                so = record.so.as_deref().unwrap_or(""),
                uen = %record.uen,
                partner = ?record.partner_id,
                payment_status = %record.payment_status,
                "normalized sale order"
            );
        }
        Ok(records)
    }

    /// Scans already-parsed rows. Payment status is not derived here.
    pub async fn normalize_rows(&self, rows: &[Value]) -> Vec<NormalizedRecord> {
        let mut scanner = Scanner::new();
        for event in scan_events(rows) {
            scanner.step(event, self.resolver).await;
        }
        scanner.finish()
    }
}
