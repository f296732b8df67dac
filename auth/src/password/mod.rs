pub mod errors;
pub mod kdf;

pub use errors::PasswordError;
pub use kdf::PasswordHasher;
