pub mod config;
pub mod logging;
pub mod network;
pub mod notifications;

pub use config::MocConfig;
pub use network::{Network, NetworkConfig, get_network_configs, is_http_url};
pub use notifications::{AppNotification, NotificationStore, NotificationType};
