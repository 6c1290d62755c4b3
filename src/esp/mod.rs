//! ESP-IDF 上的协作方实现

mod nvs;
mod server;
mod wifi;

pub use nvs::NvsStore;
pub use server::EspRouteHost;
pub use wifi::{EspRadio, AP_IP};
