//! External service integrations.

pub mod odoo {
    pub use crate::odoo_client::*;
    pub use crate::request_builder::*;
    pub use crate::transport::*;
    pub use crate::xmlrpc;
}

pub mod payments {
    pub use crate::payments::*;
}
