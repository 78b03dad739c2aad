pub mod http_shortlink;
pub mod keyboard;
pub mod teloxide_gateway;

pub use http_shortlink::HttpShortlinkMinter;
pub use teloxide_gateway::TeloxideGateway;
