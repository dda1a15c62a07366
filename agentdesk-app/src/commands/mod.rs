pub mod account;
pub mod agents;
pub mod billing;
pub mod profile;
pub mod watch;
