//! `nodes` crate — node definitions and the executor that runs a single node.
//!
//! An HTTP node's unit of work goes through the [`HttpTransport`] seam so the
//! executor can be driven by `reqwest` in production and by [`MockTransport`]
//! in tests. [`NodeExecutor`] wraps a transport with the node's loop policy.
//!
//! [`MockTransport`]: mock::MockTransport

pub mod error;
pub mod model;
pub mod traits;
pub mod http;
pub mod executor;
pub mod mock;

pub use error::NodeError;
pub use executor::NodeExecutor;
pub use http::{ReqwestTransport, TransportConfig};
pub use model::{HttpConfig, JoinMode, LoopConfig, LoopPolicy, Node, NodeResult, NodeType};
pub use traits::{HttpResponse, HttpTransport};
