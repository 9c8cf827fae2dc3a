mod claims;
pub(crate) mod extractors;
pub mod keys;

pub use extractors::AuthUser;
