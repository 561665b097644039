// HTTP plumbing
//
// Two separate paths:
// - `client`: a full client abstraction for the small manifest and tracking
//   requests (platform supplies it)
// - `request` + `scanner`: hand-written GET and header scanner for the image
//   download, so the body can be streamed straight into flash

pub mod client;
pub mod request;
pub mod scanner;

pub use client::{HttpClient, HttpResponse};
pub use scanner::{TransferState, ACCEPTED_CONTENT_TYPE};
