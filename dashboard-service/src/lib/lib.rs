pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;

pub use domain::account;
pub use domain::auth;
pub use domain::client;
pub use domain::storage;
pub use domain::user;
