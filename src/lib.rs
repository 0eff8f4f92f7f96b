//! nio client library
//!
//! Manages blocks and services on a nio automation server through its HTTP
//! control API: typed block properties built from server templates, entity
//! mirrors with save/copy/delete, and status polling for service start/stop.

pub mod block;
pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod instance;
pub mod poller;
pub mod service;
pub mod template;
pub mod transport;
pub mod types;
pub mod value;

pub use block::Block;
pub use config::{ClientConfig, PollSettings, RetrySettings};
pub use container::{Node, Properties};
pub use error::{NioError, Result};
pub use instance::Instance;
pub use poller::{
    CancelToken, PollOutcome, PollPhase, PollPolicy, StatusSource, TransitionError,
    TransitionPoller,
};
pub use service::{ExecutionEntry, Service};
pub use template::{Template, load_block};
pub use transport::{
    HttpTransport, Rest, RetryPolicy, Sleeper, ThreadSleeper, Transport, TransportError,
};
pub use types::{Status, ValueKind};
pub use value::{Property, PropertyError, ValueType};
