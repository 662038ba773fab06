//! Event stream connection: state machine, reconnect policy, control task
//! and the HTTP collaborators it drives.

pub mod http;
pub mod reconnect;
pub mod state;
pub mod transport;

pub use http::{
    ByteStream, HttpSseConnector, HttpSubscriptionRpc, StreamConnector, SubscriptionRpc,
};
pub use reconnect::ReconnectPolicy;
pub use state::{ConnectionState, TransportStatus};
pub use transport::Transport;
