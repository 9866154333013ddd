// Domain-layer modules and shared errors/models
pub mod ingestion {
    pub use crate::ingestion::*;
}

pub mod normalizer {
    pub use crate::normalizer::*;
}

pub mod resolver {
    pub use crate::resolver::*;
}

pub mod renewal_collection {
    pub use crate::renewal_collection::*;
}

pub mod dashboard {
    pub use crate::dashboard::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
