//! Sales Operations API Library
//!
//! Pulls sale orders out of an Odoo ERP over XML-RPC, normalizes them into
//! flat records enriched with partner contact details, and serves them to
//! the sales dashboard together with follow-up notes and payment status.
//!
//! # Modules
//!
//! - `api`: HTTP route table.
//! - `core`: Ingestion, normalization and dashboard logic.
//! - `integrations`: ERP and payment processor clients.
//! - `auth`: Session gate for dashboard requests.
//! - `config`: Configuration management.
//! - `dashboard`: Follow-up and payment merge into dashboard rows.
//! - `db`: Database connection and schema.
//! - `debug_dump`: Raw ERP response dumps for troubleshooting.
//! - `errors`: Error handling types.
//! - `follow_ups`: Follow-up storage.
//! - `handlers`: HTTP request handlers.
//! - `ingestion`: Month queries against the ERP.
//! - `models`: Core data models.
//! - `normalizer`: Sale order response normalization.
//! - `odoo_client`: Authenticated ERP calls.
//! - `payments`: Payment processor lookups.
//! - `renewal_collection`: Weekly renewal and new-lead collection totals.
//! - `request_builder`: XML-RPC request bodies.
//! - `resolver`: Partner lookups.
//! - `transport`: HTTP transport with retries.
//! - `xmlrpc`: XML-RPC value model and parser.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod debug_dump;
pub mod errors;
pub mod follow_ups;
pub mod handlers;
pub mod ingestion;
pub mod models;
pub mod normalizer;
pub mod odoo_client;
pub mod payments;
pub mod renewal_collection;
pub mod request_builder;
pub mod resolver;
pub mod transport;
pub mod xmlrpc;
