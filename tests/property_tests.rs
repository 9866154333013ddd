/// Property-based tests using proptest
/// Tests invariants of the XML-RPC parser and the sale order normalizer
use async_trait::async_trait;
use proptest::prelude::*;
use rust_sales_ops_api::errors::AppError;
use rust_sales_ops_api::ingestion::month_range;
use rust_sales_ops_api::models::{NormalizedRecord, PartnerDetails};
use rust_sales_ops_api::normalizer::{apply_payment_status, ResponseNormalizer};
use rust_sales_ops_api::resolver::PartnerResolver;
use rust_sales_ops_api::xmlrpc::parse_response;

struct CannedPartner;

#[async_trait]
impl PartnerResolver for CannedPartner {
    async fn resolve(&self, partner_id: i64) -> PartnerDetails {
        PartnerDetails {
            email: format!("p{}@example.com", partner_id),
            ..PartnerDetails::empty(partner_id)
        }
    }
}

fn normalize(raw: &str) -> Result<Vec<NormalizedRecord>, AppError> {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(ResponseNormalizer::new(&CannedPartner).normalize(raw))
}

fn response_with_orders(names: &[String], empty_every: Option<usize>) -> String {
    let mut values = String::new();
    for (i, name) in names.iter().enumerate() {
        if empty_every.is_some_and(|n| i % n == 0) {
            values.push_str("<value><struct></struct></value>");
        }
        values.push_str(&format!(
            "<value><struct>\
             <member><name>name</name><value><string>{}</string></value></member>\
             <member><name>partner_id</name><value><array><data>\
             <value><int>{}</int></value><value><string>Partner</string></value>\
             </data></array></value></member>\
             </struct></value>",
            name,
            i + 1
        ));
    }
    format!(
        "<?xml version='1.0'?><methodResponse><params><param><value><array><data>{}</data></array></value></param></params></methodResponse>",
        values
    )
}

// Property: every non-empty record comes out once, in source order
proptest! {
    #[test]
    fn n_records_in_n_records_out(names in prop::collection::vec("S[0-9]{5}", 0..12)) {
        let records = normalize(&response_with_orders(&names, None)).unwrap();
        let so: Vec<String> = records.iter().filter_map(|r| r.so.clone()).collect();
        prop_assert_eq!(so, names.clone());
        for (i, record) in records.iter().enumerate() {
            prop_assert_eq!(&record.email, &format!("p{}@example.com", i + 1));
        }
    }

    #[test]
    fn empty_records_are_dropped(
        names in prop::collection::vec("S[0-9]{5}", 1..8),
        every in 1usize..4
    ) {
        let records = normalize(&response_with_orders(&names, Some(every))).unwrap();
        prop_assert_eq!(records.len(), names.len());
    }
}

// Property: faults and missing envelopes never yield records
proptest! {
    #[test]
    fn fault_message_is_extracted_verbatim(
        message in "[A-Za-z0-9][A-Za-z0-9 .:']{0,40}",
        code in 1i64..1000
    ) {
        let raw = format!(
            "<?xml version='1.0'?><methodResponse><fault><value><struct>\
             <member><name>faultCode</name><value><int>{}</int></value></member>\
             <member><name>faultString</name><value><string>{}</string></value></member>\
             </struct></value></fault></methodResponse>",
            code,
            message.replace('\'', "&apos;")
        );
        match normalize(&raw) {
            Err(AppError::UpstreamFault { message: got, code: got_code }) => {
                prop_assert_eq!(got, message);
                prop_assert_eq!(got_code, Some(code));
            }
            other => prop_assert!(false, "expected fault, got {:?}", other),
        }
    }

    #[test]
    fn missing_envelope_is_always_malformed(body in "\\PC*") {
        prop_assume!(!body.contains("<methodResponse") && !body.contains("<fault>"));
        prop_assert!(matches!(parse_response(&body), Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn parser_never_panics(body in "\\PC*") {
        let _ = parse_response(&body);
        let _ = parse_response(&format!("<methodResponse>{}", body));
    }
}

// Property: payment status is an exact, case-sensitive match
proptest! {
    #[test]
    fn only_exact_paid_marks_paid(reference in "[A-Za-z ]{0,8}") {
        let mut records = vec![NormalizedRecord {
            payment_reference: Some(reference.clone()),
            ..Default::default()
        }];
        apply_payment_status(&mut records);
        let expected = if reference == "paid" { "Paid" } else { "" };
        prop_assert_eq!(records[0].payment_status.as_str(), expected);
    }
}

// Property: month ranges always span one whole calendar month
proptest! {
    #[test]
    fn month_range_spans_the_month(year in 1970i32..2100, month in 1u32..=12) {
        let (start, end) = month_range(&format!("{:04}-{:02}", year, month)).unwrap();
        let prefix = format!("{:04}-{:02}-", year, month);
        prop_assert_eq!(start, format!("{}01", prefix));
        prop_assert!(end.starts_with(&prefix));
        let last_day: u32 = end[8..].parse().unwrap();
        prop_assert!((28..=31).contains(&last_day));
    }
}
