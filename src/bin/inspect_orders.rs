//! Utility to fetch one month of sale orders from the ERP and print them as JSON.
//!
//! Usage: `inspect_orders YYYY-MM`

use rust_sales_ops_api::config::Config;
use rust_sales_ops_api::ingestion::SaleOrderIngestion;
use rust_sales_ops_api::odoo_client::OdooClient;
use std::env;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_sales_ops_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let month = env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: inspect_orders YYYY-MM"))?;

    // Same ERP settings as the server, without requiring DB_URL
    let config = Config::from_env_without_database()?;
    let client = Arc::new(OdooClient::from_config(&config)?);

    let records = SaleOrderIngestion::new(client, config.memoize_partner_lookups)
        .fetch_month(&month)
        .await?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    eprintln!("{} sale order(s) in {}", records.len(), month);

    Ok(())
}
