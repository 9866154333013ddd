//! XML-RPC wire representation used to talk to the ERP.
//!
//! Requests are serialized from [`MethodCall`]; responses are parsed with an
//! event reader into [`Value`] trees. Field-level interpretation of those trees
//! lives in `normalizer`.

use crate::errors::AppError;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Message used when a fault is present but its body cannot be read.
pub const UNKNOWN_FAULT: &str = "Unknown XML-RPC fault";

/// A single XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    DateTime(String),
    Base64(String),
    Nil,
    Array(Vec<Value>),
    Struct(Vec<Member>),
}

/// A struct member. Members keep the order they had on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub value: Value,
}

impl Member {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl Value {
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Member]> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Looks up a struct member by name. `None` for non-structs.
    pub fn member(&self, name: &str) -> Option<&Value> {
        self.as_struct()?
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.value)
    }

    /// The ERP encodes "no value" as `false` rather than an empty string.
    pub fn is_empty_marker(&self) -> bool {
        match self {
            Value::Bool(false) | Value::Nil => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// First integer literal found depth-first.
    pub fn first_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Array(items) => items.iter().find_map(Value::first_int),
            Value::Struct(members) => members.iter().find_map(|m| m.value.first_int()),
            _ => None,
        }
    }

    /// First non-empty string literal found depth-first.
    pub fn first_string(&self) -> Option<&str> {
        match self {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Array(items) => items.iter().find_map(Value::first_string),
            Value::Struct(members) => members.iter().find_map(|m| m.value.first_string()),
            _ => None,
        }
    }

    /// First floating-point literal found depth-first.
    pub fn first_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Array(items) => items.iter().find_map(Value::first_double),
            Value::Struct(members) => members.iter().find_map(|m| m.value.first_double()),
            _ => None,
        }
    }

    /// Appends the `<value>` element for this value to `out`.
    pub fn write_xml(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Value::Int(i) => {
                out.push_str("<int>");
                out.push_str(&i.to_string());
                out.push_str("</int>");
            }
            Value::Bool(b) => {
                out.push_str(if *b {
                    "<boolean>1</boolean>"
                } else {
                    "<boolean>0</boolean>"
                });
            }
            Value::Double(d) => {
                out.push_str("<double>");
                out.push_str(&d.to_string());
                out.push_str("</double>");
            }
            Value::String(s) => {
                out.push_str("<string>");
                out.push_str(&escape(s.as_str()));
                out.push_str("</string>");
            }
            Value::DateTime(s) => {
                out.push_str("<dateTime.iso8601>");
                out.push_str(&escape(s.as_str()));
                out.push_str("</dateTime.iso8601>");
            }
            Value::Base64(s) => {
                out.push_str("<base64>");
                out.push_str(&escape(s.as_str()));
                out.push_str("</base64>");
            }
            Value::Nil => out.push_str("<nil/>"),
            Value::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write_xml(out);
                }
                out.push_str("</data></array>");
            }
            Value::Struct(members) => {
                out.push_str("<struct>");
                for member in members {
                    out.push_str("<member><name>");
                    out.push_str(&escape(member.name.as_str()));
                    out.push_str("</name>");
                    member.value.write_xml(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
        }
        out.push_str("</value>");
    }
}

/// An outbound XML-RPC call.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new(method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            params,
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str("<?xml version=\"1.0\"?>\n<methodCall>\n<methodName>");
        out.push_str(&escape(self.method_name.as_str()));
        out.push_str("</methodName>\n<params>\n");
        for param in &self.params {
            out.push_str("<param>");
            param.write_xml(&mut out);
            out.push_str("</param>\n");
        }
        out.push_str("</params>\n</methodCall>\n");
        out
    }
}

/// Parses a `methodResponse` and returns its params.
///
/// Fault and envelope checks run on the raw text before any structural
/// parsing, so a fault always wins over a broken document.
pub fn parse_response(raw: &str) -> Result<Vec<Value>, AppError> {
    if raw.contains("<fault>") {
        return Err(extract_fault(raw));
    }

    if !raw.contains("<methodResponse") {
        return Err(AppError::MalformedResponse(
            "missing methodResponse envelope".to_string(),
        ));
    }

    match Parser::new(raw).document()? {
        Response::Params(params) => Ok(params),
        Response::Fault(fault) => Err(fault),
    }
}

fn extract_fault(raw: &str) -> AppError {
    match Parser::new(raw).document() {
        Ok(Response::Fault(fault)) => fault,
        _ => AppError::UpstreamFault {
            message: UNKNOWN_FAULT.to_string(),
            code: None,
        },
    }
}

fn fault_from_value(value: &Value) -> AppError {
    let message = match value.member("faultString") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => UNKNOWN_FAULT.to_string(),
    };
    let code = match value.member("faultCode") {
        Some(Value::Int(i)) => Some(*i),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    AppError::UpstreamFault { message, code }
}

enum Response {
    Params(Vec<Value>),
    Fault(AppError),
}

#[derive(Debug)]
enum Token {
    Start(String),
    End(String),
    Empty(String),
    Text(String),
    Eof,
}

fn malformed(msg: impl Into<String>) -> AppError {
    AppError::MalformedResponse(msg.into())
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(xml: &'a str) -> Self {
        Self {
            reader: Reader::from_str(xml),
        }
    }

    fn next_token(&mut self) -> Result<Token, AppError> {
        loop {
            let event = self
                .reader
                .read_event()
                .map_err(|e| malformed(format!("invalid XML: {}", e)))?;
            let token = match event {
                Event::Start(e) => Token::Start(tag_name(e.name().as_ref())),
                Event::End(e) => Token::End(tag_name(e.name().as_ref())),
                Event::Empty(e) => Token::Empty(tag_name(e.name().as_ref())),
                Event::Text(t) => Token::Text(
                    t.unescape()
                        .map_err(|e| malformed(format!("invalid text: {}", e)))?
                        .into_owned(),
                ),
                Event::CData(c) => Token::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
                Event::Eof => Token::Eof,
                _ => continue,
            };
            return Ok(token);
        }
    }

    /// Next token outside of text content; whitespace between elements is skipped.
    fn next_structural(&mut self) -> Result<Token, AppError> {
        loop {
            match self.next_token()? {
                Token::Text(t) if t.trim().is_empty() => continue,
                Token::Text(t) => return Err(malformed(format!("unexpected text '{}'", t.trim()))),
                other => return Ok(other),
            }
        }
    }

    fn expect_start(&mut self, name: &str) -> Result<(), AppError> {
        match self.next_structural()? {
            Token::Start(tag) if tag == name => Ok(()),
            other => Err(malformed(format!("expected <{}>, found {:?}", name, other))),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<(), AppError> {
        match self.next_structural()? {
            Token::End(tag) if tag == name => Ok(()),
            other => Err(malformed(format!("expected </{}>, found {:?}", name, other))),
        }
    }

    fn document(mut self) -> Result<Response, AppError> {
        self.expect_start("methodResponse")?;

        let response = match self.next_structural()? {
            Token::Start(tag) if tag == "params" => Response::Params(self.params()?),
            Token::Empty(tag) if tag == "params" => Response::Params(Vec::new()),
            Token::Start(tag) if tag == "fault" => {
                self.expect_start("value")?;
                let value = self.value()?;
                self.expect_end("fault")?;
                Response::Fault(fault_from_value(&value))
            }
            other => {
                return Err(malformed(format!(
                    "expected <params> or <fault>, found {:?}",
                    other
                )))
            }
        };

        self.expect_end("methodResponse")?;
        Ok(response)
    }

    fn params(&mut self) -> Result<Vec<Value>, AppError> {
        let mut params = Vec::new();
        loop {
            match self.next_structural()? {
                Token::Start(tag) if tag == "param" => {
                    self.expect_start("value")?;
                    params.push(self.value()?);
                    self.expect_end("param")?;
                }
                Token::End(tag) if tag == "params" => return Ok(params),
                other => return Err(malformed(format!("unexpected {:?} in <params>", other))),
            }
        }
    }

    /// Reads the content of a `<value>` whose start tag was just consumed.
    fn value(&mut self) -> Result<Value, AppError> {
        let mut text = String::new();
        let mut typed: Option<Value> = None;
        loop {
            match self.next_token()? {
                Token::Text(t) => text.push_str(&t),
                Token::Start(tag) => {
                    if typed.is_some() {
                        return Err(malformed("more than one type inside <value>"));
                    }
                    typed = Some(self.typed(&tag)?);
                }
                Token::Empty(tag) => {
                    if typed.is_some() {
                        return Err(malformed("more than one type inside <value>"));
                    }
                    typed = Some(empty_typed(&tag)?);
                }
                Token::End(tag) if tag == "value" => {
                    // An untyped value is a string, whitespace included.
                    return Ok(typed.unwrap_or(Value::String(text)));
                }
                Token::End(tag) => {
                    return Err(malformed(format!("unexpected </{}> inside <value>", tag)))
                }
                Token::Eof => return Err(malformed("document ended inside <value>")),
            }
        }
    }

    fn typed(&mut self, tag: &str) -> Result<Value, AppError> {
        match tag {
            "array" => self.array(),
            "struct" => self.structure(),
            _ => {
                let text = self.text_until(tag)?;
                scalar(tag, text)
            }
        }
    }

    fn text_until(&mut self, tag: &str) -> Result<String, AppError> {
        let mut text = String::new();
        loop {
            match self.next_token()? {
                Token::Text(t) => text.push_str(&t),
                Token::End(end) if end == tag => return Ok(text),
                other => {
                    return Err(malformed(format!(
                        "unexpected {:?} inside <{}>",
                        other, tag
                    )))
                }
            }
        }
    }

    fn array(&mut self) -> Result<Value, AppError> {
        let mut items = Vec::new();
        match self.next_structural()? {
            Token::Empty(tag) if tag == "data" => {}
            Token::Start(tag) if tag == "data" => loop {
                match self.next_structural()? {
                    Token::Start(tag) if tag == "value" => items.push(self.value()?),
                    Token::Empty(tag) if tag == "value" => items.push(Value::String(String::new())),
                    Token::End(tag) if tag == "data" => break,
                    other => return Err(malformed(format!("unexpected {:?} in <data>", other))),
                }
            },
            other => return Err(malformed(format!("expected <data>, found {:?}", other))),
        }
        self.expect_end("array")?;
        Ok(Value::Array(items))
    }

    fn structure(&mut self) -> Result<Value, AppError> {
        let mut members = Vec::new();
        loop {
            match self.next_structural()? {
                Token::Start(tag) if tag == "member" => members.push(self.member()?),
                Token::End(tag) if tag == "struct" => return Ok(Value::Struct(members)),
                other => return Err(malformed(format!("unexpected {:?} in <struct>", other))),
            }
        }
    }

    fn member(&mut self) -> Result<Member, AppError> {
        let mut name = None;
        let mut value = None;
        loop {
            match self.next_structural()? {
                Token::Start(tag) if tag == "name" => name = Some(self.text_until("name")?),
                Token::Start(tag) if tag == "value" => value = Some(self.value()?),
                Token::Empty(tag) if tag == "value" => value = Some(Value::String(String::new())),
                Token::End(tag) if tag == "member" => break,
                other => return Err(malformed(format!("unexpected {:?} in <member>", other))),
            }
        }
        match (name, value) {
            (Some(name), Some(value)) => Ok(Member { name, value }),
            (None, _) => Err(malformed("<member> without <name>")),
            (Some(name), None) => Err(malformed(format!("member '{}' has no <value>", name))),
        }
    }
}

fn scalar(tag: &str, text: String) -> Result<Value, AppError> {
    match tag {
        "string" => Ok(Value::String(text)),
        "int" | "i4" | "i8" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| malformed(format!("invalid <{}> '{}'", tag, text))),
        "boolean" => match text.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(malformed(format!("invalid <boolean> '{}'", other))),
        },
        "double" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| malformed(format!("invalid <double> '{}'", text))),
        "dateTime.iso8601" => Ok(Value::DateTime(text.trim().to_string())),
        "base64" => Ok(Value::Base64(text.trim().to_string())),
        "nil" => Ok(Value::Nil),
        other => Err(malformed(format!("unknown value type <{}>", other))),
    }
}

fn empty_typed(tag: &str) -> Result<Value, AppError> {
    match tag {
        "string" => Ok(Value::String(String::new())),
        "base64" => Ok(Value::Base64(String::new())),
        "nil" => Ok(Value::Nil),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Struct(Vec::new())),
        other => Err(malformed(format!("empty <{}/> is not a value", other))),
    }
}
