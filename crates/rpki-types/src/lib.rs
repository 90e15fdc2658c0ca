//! Foundation types for the RPKI object store.
//!
//! Every other crate in the workspace depends on `rpki-types`.
//!
//! # Key Types
//!
//! - [`Key`]: ordered byte identifier; SHA-256 of the content for objects
//! - [`ObjectType`]: certificate, manifest, CRL, ROA, ...
//! - [`ValidationCheck`]: one finding produced during a validation run
//! - [`ValidationResult`]: accumulator for findings, including soft decode failures
//! - [`CheckStatus`]: passed / warning / error

pub mod error;
pub mod key;
pub mod object_type;
pub mod validation;

pub use error::TypeError;
pub use key::{Key, SHA256_LEN};
pub use object_type::ObjectType;
pub use validation::{CheckStatus, ValidationCheck, ValidationResult};
