//! ESP-IDF implementations of the platform traits

pub mod config_store;
pub mod device;
pub mod flash;
pub mod http;
pub mod wifi;

pub use device::EspDevice;
pub use flash::EspFlashSink;
pub use http::EspHttpClient;
pub use wifi::WifiManager;
