//! Content-addressed storage of decoded RPKI objects.
//!
//! Objects are keyed by the SHA-256 of their payload and indexed by
//! location, reachability instant, authority key identifier and type.
//! Objects that no validation pass has confirmed since a threshold are
//! removed by [`ObjectStore::delete_unreachable_objects`] or its chunked
//! variant [`ObjectStore::sweep_unreachable_objects`].

pub mod error;
pub mod object;
pub mod store;
pub mod verify;

pub use error::{DecodeError, ObjectError, ObjectResult};
pub use object::{RpkiObject, SerialNumber, TypedObject};
pub use store::{ObjectStore, ObjectStream};
pub use verify::{IndexProblem, VerifyReport};
