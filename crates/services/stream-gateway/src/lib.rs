//! Stream Gateway
//!
//! Single HTTP/WebSocket entry point for the local streaming stack. REST calls
//! are forwarded to the device manager and relayed back verbatim; WebSocket
//! subscribers receive the RTMP server's stream statistics once per second.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           stream-gateway                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐                                                   │
//! │  │  Route Dispatcher│ ← /api/streams, /api/devices, /api/recordings     │
//! │  │  (axum)          │ ← GET /ws (upgrade)                               │
//! │  └───┬──────────┬───┘                                                   │
//! │      │ REST     │ upgrade                                               │
//! │      ▼          ▼                                                       │
//! │  ┌──────────┐  ┌───────────────────┐                                    │
//! │  │ Forwarder│  │ Broadcast Session │ one task per socket, 1s ticks      │
//! │  └────┬─────┘  └─────────┬─────────┘                                    │
//! │       │                  │                                              │
//! │       ▼                  ▼                                              │
//! │  ┌──────────────┐  ┌──────────────┐                                     │
//! │  │ Device mgr   │  │ Stats Poller │ → GET <rtmp>/stat                   │
//! │  │ client       │  └──────────────┘                                     │
//! │  └──────────────┘                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod stats;
pub mod upstream;
