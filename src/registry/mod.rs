//! Connection registry for broadcast fan-out
//!
//! The registry tracks every live client connection by endpoint identity.
//! The listener inserts and removes entries as clients come and go; the
//! broadcast sink reads it to fan out frames and removes clients whose
//! writes fail.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<ConnectionRegistry>
//!                   ┌──────────────────────────────┐
//!                   │ connections: HashMap<        │
//!                   │   "addr:port",               │
//!                   │   Arc<ClientConnection>      │
//!                   │ >                            │
//!                   └──────────────┬───────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!    [RelayServer]          [BroadcastSink]          [reader task]
//!    insert() on accept     snapshot() + write       remove_session()
//!                           remove() on failure      on EOF / error
//! ```

pub mod connection;
pub mod store;

pub use connection::{endpoint_id, ClientConnection, ConnectionWriter};
pub use store::ConnectionRegistry;
