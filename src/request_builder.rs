//! Outbound request bodies for the ERP's XML-RPC API.
//!
//! No I/O happens here. Every builder is deterministic: the same inputs give
//! byte-identical bodies.

use crate::errors::AppError;
use crate::xmlrpc::{Member, MethodCall, Value};

/// ERP connection settings as configured. Fields are checked on use.
#[derive(Debug, Clone, Default)]
pub struct OdooCredentials {
    pub url: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Credentials that passed validation.
#[derive(Debug, Clone)]
pub struct ValidCredentials<'a> {
    pub url: &'a str,
    pub database: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::ConfigurationError(format!("{} is not configured", name)))
}

impl OdooCredentials {
    pub fn require(&self) -> Result<ValidCredentials<'_>, AppError> {
        Ok(ValidCredentials {
            url: required(&self.url, "ODOO_URL")?,
            database: required(&self.database, "ODOO_DB")?,
            username: required(&self.username, "ODOO_USERNAME")?,
            password: required(&self.password, "ODOO_PASSWORD")?,
        })
    }
}

/// Comparison operators accepted in a search domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Like,
    ILike,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "!=",
            FilterOp::Like => "like",
            FilterOp::ILike => "ilike",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::In => "in",
            FilterOp::NotIn => "not in",
        }
    }
}

/// One `(field, operator, value)` triple of a search domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// A single read against one ERP model. Filters are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub entity_name: String,
    pub filters: Vec<Filter>,
    pub fields: Vec<String>,
    pub ordering: Option<String>,
    pub limit: Option<u32>,
}

impl QueryRequest {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            filters: Vec::new(),
            fields: Vec::new(),
            ordering: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn order(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = Some(ordering.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn domain(&self) -> Value {
        Value::Array(
            self.filters
                .iter()
                .map(|f| {
                    Value::Array(vec![
                        Value::String(f.field.clone()),
                        Value::String(f.op.as_str().to_string()),
                        f.value.clone(),
                    ])
                })
                .collect(),
        )
    }

    fn keywords(&self) -> Value {
        let mut members = vec![Member::new(
            "fields",
            Value::Array(self.fields.iter().map(|f| Value::String(f.clone())).collect()),
        )];
        if let Some(ref ordering) = self.ordering {
            members.push(Member::new("order", ordering.as_str()));
        }
        if let Some(limit) = self.limit {
            members.push(Member::new("limit", i64::from(limit)));
        }
        Value::Struct(members)
    }
}

/// `common.authenticate(db, login, password, {})`.
pub fn authenticate_request(credentials: &OdooCredentials) -> Result<String, AppError> {
    let creds = credentials.require()?;
    Ok(MethodCall::new(
        "authenticate",
        vec![
            creds.database.into(),
            creds.username.into(),
            creds.password.into(),
            Value::Struct(Vec::new()),
        ],
    )
    .to_xml())
}

/// `object.execute_kw(db, uid, password, model, "search_read", [domain], {fields, order, limit})`.
pub fn search_read_request(
    credentials: &OdooCredentials,
    uid: i64,
    query: &QueryRequest,
) -> Result<String, AppError> {
    let creds = credentials.require()?;
    if query.entity_name.trim().is_empty() {
        return Err(AppError::BadRequest("entity name is required".to_string()));
    }
    Ok(MethodCall::new(
        "execute_kw",
        vec![
            creds.database.into(),
            Value::Int(uid),
            creds.password.into(),
            query.entity_name.as_str().into(),
            "search_read".into(),
            Value::Array(vec![query.domain()]),
            query.keywords(),
        ],
    )
    .to_xml())
}

/// `common.version()`; needs no credentials.
pub fn version_request() -> String {
    MethodCall::new("version", Vec::new()).to_xml()
}
