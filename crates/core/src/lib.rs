pub mod paths;
pub mod routes;
pub mod types;

pub use paths::{AgentScope, IntegrationKind, MetaChannel, OpsResource};
pub use routes::{Navigator, Route};
pub use types::*;
