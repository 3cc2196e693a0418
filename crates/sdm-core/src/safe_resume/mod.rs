//! Safe resume: re-validate ETag/Last-Modified/size before resuming.
//!
//! On resume the coordinator probes the URL again and compares the result with
//! the metadata stored in the snapshot. Any difference means the partial file
//! holds bytes of a different resource; the download fails with
//! `ResourceChanged` and must be restarted with a fresh `submit`.

mod validate;

pub use validate::{validate_for_resume, ValidationError, ValidationErrorKind};
