use crate::config::Config;
use crate::debug_dump::DebugDump;
use crate::errors::AppError;
use crate::request_builder::{
    authenticate_request, search_read_request, version_request, OdooCredentials, QueryRequest,
};
use crate::resolver::PARTNER_MODEL;
use crate::transport::{Endpoint, HttpTransport, RetryPolicy, XmlRpcTransport};
use crate::xmlrpc::{parse_response, Value};
use std::sync::Arc;

/// An authenticated ERP session. The uid is threaded into every data call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdooSession {
    pub uid: i64,
}

/// Client for the ERP's XML-RPC API.
///
/// Built once at start-up and shared by `Arc`. Credentials are validated on
/// the first call that needs them, not here.
#[derive(Clone)]
pub struct OdooClient {
    transport: Arc<dyn XmlRpcTransport>,
    credentials: OdooCredentials,
    dump: DebugDump,
}

impl OdooClient {
    pub fn new(transport: Arc<dyn XmlRpcTransport>, credentials: OdooCredentials) -> Self {
        Self {
            transport,
            credentials,
            dump: DebugDump::disabled(),
        }
    }

    /// HTTP client with the configured retry policy and debug dumps.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let retry = RetryPolicy {
            max_attempts: config.odoo_max_attempts,
            base_backoff: std::time::Duration::from_millis(config.odoo_backoff_ms),
        };
        let transport = HttpTransport::new(config.odoo_url.clone(), retry)?;

        Ok(Self::new(Arc::new(transport), config.odoo_credentials()).with_debug_dump(
            DebugDump::new(config.debug_dump_dir.clone(), config.debug_partner_details),
        ))
    }

    pub fn with_debug_dump(mut self, dump: DebugDump) -> Self {
        self.dump = dump;
        self
    }

    pub fn debug_dump(&self) -> &DebugDump {
        &self.dump
    }

    /// Logs in and returns the session uid.
    pub async fn authenticate(&self) -> Result<OdooSession, AppError> {
        let body = authenticate_request(&self.credentials)?;
        let raw = self.transport.send(Endpoint::Common, body).await?;
        let params = parse_response(&raw)?;

        match params.first() {
            Some(Value::Int(uid)) if *uid > 0 => {
                tracing::info!("Authenticated with ERP as uid {}", uid);
                Ok(OdooSession { uid: *uid })
            }
            Some(_) => Err(AppError::UpstreamFault {
                message: "authentication rejected".to_string(),
                code: None,
            }),
            None => Err(AppError::MalformedResponse(
                "authenticate returned no value".to_string(),
            )),
        }
    }

    /// Runs a `search_read` and returns the raw response text.
    pub async fn search_read(
        &self,
        session: &OdooSession,
        query: &QueryRequest,
    ) -> Result<String, AppError> {
        let body = search_read_request(&self.credentials, session.uid, query)?;
        tracing::debug!(
            "search_read {} with {} filter(s), {} field(s)",
            query.entity_name,
            query.filters.len(),
            query.fields.len()
        );
        self.transport.send(Endpoint::Object, body).await
    }

    /// Runs a `search_read` and returns the row structs.
    pub async fn search_read_rows(
        &self,
        session: &OdooSession,
        query: &QueryRequest,
    ) -> Result<Vec<Value>, AppError> {
        let raw = self.search_read(session, query).await?;
        if query.entity_name == PARTNER_MODEL && self.dump.dumps_partner_details() {
            self.dump.write("partner-details-response", &raw).await;
        }
        rows_from_params(parse_response(&raw)?)
    }

    /// Probes the `common` endpoint. Never fails; returns reachability.
    pub async fn check_endpoint(&self) -> bool {
        match self
            .transport
            .send(Endpoint::Common, version_request())
            .await
            .and_then(|raw| parse_response(&raw))
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("ERP endpoint check failed: {}", e);
                false
            }
        }
    }
}

/// `search_read` answers with a single array param of structs.
pub fn rows_from_params(params: Vec<Value>) -> Result<Vec<Value>, AppError> {
    match params.into_iter().next() {
        Some(Value::Array(rows)) => Ok(rows),
        Some(row @ Value::Struct(_)) => Ok(vec![row]),
        Some(other) => Err(AppError::MalformedResponse(format!(
            "expected a list of records, found {:?}",
            other
        ))),
        None => Err(AppError::MalformedResponse(
            "search_read returned no value".to_string(),
        )),
    }
}
