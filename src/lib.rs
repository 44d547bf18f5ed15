pub mod api;
pub mod config;
pub mod failure;
pub mod negotiate;
pub mod observability;
pub mod redispatch;
pub mod resolve;
pub mod transport;
