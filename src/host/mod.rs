//! Background host: wire contract, mailbox, tab transports, message router
//! and the stdio bridge.

pub mod contract;
pub mod mailbox;
pub mod router;
pub mod stdio;
pub mod transport;

pub use contract::{BackgroundMessage, ContentMessage, EXPLAIN_MENU, InboundEnvelope, OutboundEnvelope};
pub use mailbox::{Mailbox, Parcel};
pub use router::{Background, Dispatch, Router, RouterClient, RouterEvent, TabPort, router_channel};
pub use transport::{ChannelTransport, TabTransport};
