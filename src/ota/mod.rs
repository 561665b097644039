// OTA (Over-The-Air) update module

pub mod engine;
pub mod fota;
pub mod reporter;

pub use engine::{TransferEngine, TransferPhase};
pub use fota::Fota;
pub use reporter::TrackingPayload;

// OTA update flow:
// 1. Check the manifest endpoint, first entry decides (or force a target)
// 2. Raw GET of the image, scan the response headers
// 3. Reserve the update partition and stream the body into it
// 4. Verify the byte count (and digest if published), then commit
// 5. Report the update if tracking is on
// 6. Restart
