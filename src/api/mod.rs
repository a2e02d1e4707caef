mod client;
mod wiring;

pub use client::CallError;
pub use client::NodeHandle;
pub use client::CLIENT_TIMEOUT;
pub use wiring::start_node;
pub use wiring::NodeConfig;
pub use wiring::NodeStartError;
