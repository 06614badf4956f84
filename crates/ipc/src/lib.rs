//! The three AF_UNIX sockets figterm speaks: the legacy base64-framed
//! command channel, the binary-framed JSON hook channel, and the inbound
//! text-insertion listener.

pub mod framing;
pub mod hooks;
pub mod paths;
pub mod sockets;

pub use hooks::{HookContext, HookEnvelope, HookKind};
pub use sockets::{HookSocket, InsertionListener, IpcError, LegacySocket};
