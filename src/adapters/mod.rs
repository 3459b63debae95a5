//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements            | Connects to                |
//! |-------------|-----------------------|----------------------------|
//! | `ble`       | ProvisioningTransport | Bluedroid GATT server      |
//! | `board`     | every device port     | aggregate of the below     |
//! | `device_id` | (identity only)       | eFuse factory MAC          |
//! | `http`      | HttpPort              | ESP-IDF HTTP client (TLS)  |
//! | `log_sink`  | EventSink             | Serial log output          |
//! | `nvs`       | ConfigPort            | NVS / in-memory store      |
//! |             | StoragePort           |                            |
//! | `time`      | ClockPort, DelayNs    | ESP32 system timer         |
//! | `wifi`      | ConnectivityPort      | ESP-IDF WiFi STA           |

pub mod ble;
pub mod board;
pub mod device_id;
pub mod http;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
