//! Handle bridge between a Refal-style rewriting engine and native tensor
//! backends.
//!
//! The engine sees tensors only as integer handles inside its view field. A
//! call expression is extracted against the operation's signature, run on a
//! [`reftorch_native::Backend`], and the span is rewritten with the result,
//! or left untouched with a search-alternative signal when anything fails.

pub mod catalogue;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod ffi;
pub mod fixed;
pub mod handle;
pub mod logging;
pub mod node;
pub mod session;
pub mod view;
pub mod writer;

pub use catalogue::{lookup, Family, FileFormat, OpCode, OpSpec, OperandKind, Returns, CATALOGUE};
pub use config::BridgeConfig;
pub use dispatch::{Bridge, Invocation, Phase};
pub use error::{BridgeError, BridgeResult, ConfigError, Expected, Found};
pub use extract::{extract, Arg, Args};
pub use fixed::Scale;
pub use handle::{Handle, HandleTable};
pub use logging::init_logging;
pub use node::{ExprBuilder, Node, NodeTag, SymbolId};
pub use session::Session;
pub use view::{Span, ViewField};
pub use writer::{Output, Signal};
