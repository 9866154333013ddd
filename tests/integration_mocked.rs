/// Integration tests with a mocked ERP and payment processor
/// Runs the complete ingestion workflow over HTTP without hitting real services
use rust_sales_ops_api::errors::AppError;
use rust_sales_ops_api::ingestion::{sale_order_query, SaleOrderIngestion};
use rust_sales_ops_api::models::Reference;
use rust_sales_ops_api::odoo_client::{OdooClient, OdooSession};
use rust_sales_ops_api::payments::{PaymentStatusLookup, StripePaymentLookup};
use rust_sales_ops_api::request_builder::OdooCredentials;
use rust_sales_ops_api::transport::{HttpTransport, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMMON: &str = "/xmlrpc/2/common";
const OBJECT: &str = "/xmlrpc/2/object";

fn credentials(url: String) -> OdooCredentials {
    OdooCredentials {
        url: Some(url),
        database: Some("acme".to_string()),
        username: Some("ops@acme.test".to_string()),
        password: Some("secret".to_string()),
    }
}

/// Client pointed at the mock server, with millisecond backoff.
fn client_for(server: &MockServer) -> Arc<OdooClient> {
    let retry = RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(1),
    };
    let transport = HttpTransport::new(Some(server.uri()), retry).unwrap();
    Arc::new(OdooClient::new(
        Arc::new(transport),
        credentials(server.uri()),
    ))
}

fn method_response(value: &str) -> String {
    format!(
        "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n{}\n</param>\n</params>\n</methodResponse>\n",
        value
    )
}

fn xml_ok(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/xml")
}

fn fault(code: i64, message: &str) -> String {
    format!(
        "<?xml version='1.0'?>\n<methodResponse>\n<fault>\n<value><struct>\n\
         <member><name>faultCode</name><value><int>{}</int></value></member>\n\
         <member><name>faultString</name><value><string>{}</string></value></member>\n\
         </struct></value>\n</fault>\n</methodResponse>\n",
        code, message
    )
}

fn member(name: &str, value: &str) -> String {
    format!("<member><name>{}</name><value>{}</value></member>", name, value)
}

fn string(s: &str) -> String {
    format!("<string>{}</string>", s)
}

fn reference(id: i64, name: &str) -> String {
    format!(
        "<array><data><value><int>{}</int></value><value><string>{}</string></value></data></array>",
        id, name
    )
}

fn rows(structs: &[String]) -> String {
    let values: String = structs
        .iter()
        .map(|s| format!("<value><struct>{}</struct></value>", s))
        .collect();
    method_response(&format!("<value><array><data>{}</data></array></value>", values))
}

/// Two sale orders, the first paid in the ERP, the second not.
fn sale_orders_fixture() -> String {
    rows(&[
        [
            member("id", "<int>11</int>"),
            member("name", &string("S00219")),
            member("date_order", &string("2025-03-04 10:00:00")),
            member("create_date", &string("2025-03-04 09:58:12")),
            member("partner_id", &reference(7, "Acme Pte Ltd, Jane Tan")),
            member("amount_total", "<double>1250.5</double>"),
            member("state", &string("sale")),
            member("user_id", &reference(2, "Mitchell Admin")),
            member("company_id", &reference(1, "My Company")),
            member("x_studio_related_field_2qf_1iprtjf43", &string("paid")),
            member("x_studio_related_field_9ma_1ipqq874u", &string("INV/2025/00042")),
        ]
        .concat(),
        [
            member("id", "<int>12</int>"),
            member("name", &string("S00220")),
            member("create_date", &string("2025-03-18 14:02:40")),
            member("partner_id", &reference(8, "Beta LLP")),
            member("amount_total", "<double>99.0</double>"),
            member("state", &string("draft")),
            member("x_studio_cb_subscription_id", &string("AzZlVqU")),
            member("x_studio_existing_subs_from_chargebee", &string("Yes")),
            member("x_studio_related_field_2qf_1iprtjf43", "<boolean>0</boolean>"),
        ]
        .concat(),
    ])
}

async fn mount_authentication(server: &MockServer, uid: i64) {
    Mock::given(method("POST"))
        .and(path(COMMON))
        .and(body_string_contains("authenticate"))
        .respond_with(xml_ok(method_response(&format!(
            "<value><int>{}</int></value>",
            uid
        ))))
        .mount(server)
        .await;
}

async fn mount_partner(server: &MockServer, partner_id: i64, fields: &[String]) {
    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("res.partner"))
        .and(body_string_contains(format!("<int>{}</int>", partner_id)))
        .respond_with(xml_ok(rows(&[fields.concat()])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_month_ingestion_end_to_end() {
    let server = MockServer::start().await;
    mount_authentication(&server, 2).await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("sale.order"))
        .and(body_string_contains("2025-03-01"))
        .and(body_string_contains("2025-03-31"))
        .and(body_string_contains("date_order desc"))
        .and(body_string_contains("x_studio_related_field_9ma_1ipqq874u"))
        .respond_with(xml_ok(sale_orders_fixture()))
        .expect(1)
        .mount(&server)
        .await;

    // Contact with no UEN of their own; the parent company has one
    mount_partner(
        &server,
        7,
        &[
            member("email", &string("jane@acme.test")),
            member("phone", &string("+65 6123 4567")),
            member("parent_id", &reference(50, "Acme Pte Ltd")),
            member("l10n_sg_unique_entity_number", "<boolean>0</boolean>"),
        ],
    )
    .await;
    mount_partner(
        &server,
        50,
        &[member("l10n_sg_unique_entity_number", &string("456Y"))],
    )
    .await;
    // Company partner with its own UEN
    mount_partner(
        &server,
        8,
        &[
            member("email", &string("accounts@beta.test")),
            member("phone", "<boolean>0</boolean>"),
            member("parent_id", "<boolean>0</boolean>"),
            member("l10n_sg_unique_entity_number", &string("123X")),
        ],
    )
    .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let records = ingestion.fetch_month("2025-03").await.unwrap();

    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.id, Some(11));
    assert_eq!(first.so.as_deref(), Some("S00219"));
    assert_eq!(
        first.partner_id,
        Some(Reference::new(50, "Acme Pte Ltd, Jane Tan"))
    );
    assert_eq!(first.email, "jane@acme.test");
    assert_eq!(first.phone, "+65 6123 4567");
    assert_eq!(first.uen, "456Y");
    assert_eq!(first.amount_total, Some(1250.5));
    assert_eq!(first.user_id, Some(Reference::new(2, "Mitchell Admin")));
    assert_eq!(first.company_id, Some(Reference::new(1, "My Company")));
    assert_eq!(first.payment_status, "Paid");
    assert_eq!(first.invoice_reference.as_deref(), Some("INV/2025/00042"));

    let second = &records[1];
    assert_eq!(second.so.as_deref(), Some("S00220"));
    assert_eq!(second.partner_id, Some(Reference::new(8, "Beta LLP")));
    assert_eq!(second.email, "accounts@beta.test");
    assert_eq!(second.phone, "");
    assert_eq!(second.uen, "123X");
    assert_eq!(second.subscription_id.as_deref(), Some("AzZlVqU"));
    assert_eq!(second.existing_subscription.as_deref(), Some("Yes"));
    assert_eq!(second.payment_reference, None);
    assert_eq!(second.payment_status, "");
}

#[tokio::test]
async fn test_repeated_partner_is_looked_up_once() {
    let server = MockServer::start().await;

    let order = |id: i64, so: &str| {
        [
            member("id", &format!("<int>{}</int>", id)),
            member("name", &string(so)),
            member("partner_id", &reference(8, "Beta LLP")),
        ]
        .concat()
    };
    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("sale.order"))
        .respond_with(xml_ok(rows(&[order(21, "S00301"), order(22, "S00302")])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("res.partner"))
        .respond_with(xml_ok(rows(&[member(
            "l10n_sg_unique_entity_number",
            &string("123X"),
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let records = ingestion
        .ingest(
            &OdooSession { uid: 2 },
            &sale_order_query("2025-04-01", "2025-04-30"),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.uen == "123X"));
}

#[tokio::test]
async fn test_transport_retry_recovers_from_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMMON))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_authentication(&server, 2).await;

    let session = client_for(&server).authenticate().await.unwrap();
    assert_eq!(session, OdooSession { uid: 2 });
}

#[tokio::test]
async fn test_exhausted_retries_abort_ingestion() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMMON))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let err = ingestion.fetch_month("2025-03").await.unwrap_err();

    assert!(matches!(err.root(), AppError::TransportError(_)));
}

#[tokio::test]
async fn test_fault_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMMON))
        .respond_with(xml_ok(fault(3, "Access Denied")))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).authenticate().await.unwrap_err();
    match err.root() {
        AppError::UpstreamFault { message, code } => {
            assert_eq!(message, "Access Denied");
            assert_eq!(*code, Some(3));
        }
        other => panic!("expected fault, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_login_is_an_upstream_fault() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMMON))
        .respond_with(xml_ok(method_response(
            "<value><boolean>0</boolean></value>",
        )))
        .mount(&server)
        .await;

    let err = client_for(&server).authenticate().await.unwrap_err();
    assert!(matches!(err.root(), AppError::UpstreamFault { .. }));
}

#[tokio::test]
async fn test_sale_order_fault_aborts_ingestion() {
    let server = MockServer::start().await;
    mount_authentication(&server, 2).await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .respond_with(xml_ok(fault(
            1,
            "Invalid field 'x_studio_cb_subscription_id' on model 'sale.order'",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let err = ingestion.fetch_month("2025-03").await.unwrap_err();
    assert!(matches!(err.root(), AppError::UpstreamFault { .. }));
}

#[tokio::test]
async fn test_missing_envelope_is_malformed() {
    let server = MockServer::start().await;
    mount_authentication(&server, 2).await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .respond_with(xml_ok("<html><body>Bad Gateway</body></html>".to_string()))
        .mount(&server)
        .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let err = ingestion.fetch_month("2025-03").await.unwrap_err();
    assert!(matches!(err.root(), AppError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_partner_lookup_failure_degrades_one_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("sale.order"))
        .respond_with(xml_ok(rows(&[
            [
                member("name", &string("S00401")),
                member("partner_id", &reference(7, "Acme Pte Ltd, Jane Tan")),
            ]
            .concat(),
            [
                member("name", &string("S00402")),
                member("partner_id", &reference(8, "Beta LLP")),
            ]
            .concat(),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("res.partner"))
        .and(body_string_contains("<int>7</int>"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_partner(
        &server,
        8,
        &[
            member("email", &string("accounts@beta.test")),
            member("l10n_sg_unique_entity_number", &string("123X")),
        ],
    )
    .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), false);
    let records = ingestion
        .ingest(
            &OdooSession { uid: 2 },
            &sale_order_query("2025-03-01", "2025-03-31"),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].partner_id, Some(Reference::new(7, "Acme Pte Ltd, Jane Tan")));
    assert_eq!(records[0].email, "");
    assert_eq!(records[0].uen, "");
    assert_eq!(records[1].email, "accounts@beta.test");
    assert_eq!(records[1].uen, "123X");
}

/// One order for contact 9, who belongs to company 90.
async fn mount_single_order_for_contact(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("sale.order"))
        .respond_with(xml_ok(rows(&[[
            member("name", &string("S00601")),
            member("partner_id", &reference(9, "Gamma, Lee")),
        ]
        .concat()])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_own_uen_skips_parent_lookup() {
    let server = MockServer::start().await;
    mount_single_order_for_contact(&server).await;
    mount_partner(
        &server,
        9,
        &[
            member("email", &string("lee@gamma.test")),
            member("parent_id", &reference(90, "Gamma")),
            member("l10n_sg_unique_entity_number", &string("123X")),
        ],
    )
    .await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("res.partner"))
        .and(body_string_contains("<int>90</int>"))
        .respond_with(xml_ok(rows(&[member(
            "l10n_sg_unique_entity_number",
            &string("999Z"),
        )])))
        .expect(0)
        .mount(&server)
        .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let records = ingestion
        .ingest(
            &OdooSession { uid: 2 },
            &sale_order_query("2025-03-01", "2025-03-31"),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uen, "123X");
    // The parent is still the company even though its UEN was not needed
    assert_eq!(records[0].partner_id, Some(Reference::new(90, "Gamma, Lee")));
}

#[tokio::test]
async fn test_parent_uen_failure_keeps_parent_company() {
    let server = MockServer::start().await;
    mount_single_order_for_contact(&server).await;
    mount_partner(
        &server,
        9,
        &[
            member("email", &string("lee@gamma.test")),
            member("parent_id", &reference(90, "Gamma")),
            member("l10n_sg_unique_entity_number", "<boolean>0</boolean>"),
        ],
    )
    .await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("res.partner"))
        .and(body_string_contains("<int>90</int>"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let records = ingestion
        .ingest(
            &OdooSession { uid: 2 },
            &sale_order_query("2025-03-01", "2025-03-31"),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uen, "");
    assert_eq!(records[0].email, "lee@gamma.test");
    assert_eq!(records[0].partner_id, Some(Reference::new(90, "Gamma, Lee")));
}

#[tokio::test]
async fn test_uen_is_empty_when_partner_and_parent_lack_one() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(OBJECT))
        .and(body_string_contains("sale.order"))
        .respond_with(xml_ok(rows(&[[
            member("name", &string("S00501")),
            member("partner_id", &reference(9, "Gamma, Lee")),
        ]
        .concat()])))
        .mount(&server)
        .await;
    mount_partner(
        &server,
        9,
        &[
            member("email", &string("lee@gamma.test")),
            member("parent_id", &reference(90, "Gamma")),
        ],
    )
    .await;
    mount_partner(
        &server,
        90,
        &[member("l10n_sg_unique_entity_number", "<boolean>0</boolean>")],
    )
    .await;

    let ingestion = SaleOrderIngestion::new(client_for(&server), true);
    let records = ingestion
        .ingest(
            &OdooSession { uid: 2 },
            &sale_order_query("2025-03-01", "2025-03-31"),
        )
        .await
        .unwrap();

    assert_eq!(records[0].uen, "");
    assert_eq!(records[0].partner_id, Some(Reference::new(90, "Gamma, Lee")));
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Some(server.uri()), RetryPolicy::default()).unwrap();
    let client = OdooClient::new(
        Arc::new(transport),
        OdooCredentials {
            url: Some(server.uri()),
            ..Default::default()
        },
    );

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err.root(), AppError::ConfigurationError(_)));
}

#[tokio::test]
async fn test_stripe_lookup_finds_succeeded_intent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/search"))
        .and(query_param("query", "metadata['so']:'S00220'"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "search_result",
            "data": [
                {"id": "pi_1", "status": "requires_payment_method"},
                {"id": "pi_2", "status": "succeeded"}
            ]
        })))
        .mount(&server)
        .await;

    let lookup = StripePaymentLookup::new(server.uri(), "sk_test_123".to_string()).unwrap();
    assert!(lookup.find_payment_by_sale_reference("S00220").await.unwrap());
}

#[tokio::test]
async fn test_stripe_lookup_without_success_is_unpaid() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "pi_3", "status": "canceled"}]
        })))
        .mount(&server)
        .await;

    let lookup = StripePaymentLookup::new(server.uri(), "sk_test_123".to_string()).unwrap();
    assert!(!lookup.find_payment_by_sale_reference("S00221").await.unwrap());
}

#[tokio::test]
async fn test_stripe_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/search"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let lookup = StripePaymentLookup::new(server.uri(), "sk_bad".to_string()).unwrap();
    let result = lookup.find_payment_by_sale_reference("S00222").await;
    assert!(matches!(result, Err(AppError::ExternalApiError(_))));
}

#[tokio::test]
async fn test_stripe_intent_is_retrieved_by_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_3Mtw2a"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pi_3Mtw2a",
            "object": "payment_intent",
            "amount": 125050,
            "status": "succeeded",
            "metadata": {"so": "S00219"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"type": "invalid_request_error", "code": "resource_missing"}
        })))
        .mount(&server)
        .await;

    let lookup = StripePaymentLookup::new(server.uri(), "sk_test_123".to_string()).unwrap();

    let intent = lookup.get_payment_intent("pi_3Mtw2a").await.unwrap().unwrap();
    assert_eq!(intent["metadata"]["so"], "S00219");
    assert_eq!(intent["status"], "succeeded");

    assert!(lookup.get_payment_intent("pi_missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stripe_intent_id_is_validated_before_any_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let lookup = StripePaymentLookup::new(server.uri(), "sk_test_123".to_string()).unwrap();
    let result = lookup.get_payment_intent("../customers").await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}
