//! Resolution of remote JavaScript values, reached over the Chrome DevTools
//! Protocol, into local values.
//!
//! - [`remote`]: protocol descriptors and their dispatch shape.
//! - [`resolver`]: the recursive, cycle-aware resolver.
//! - [`protocol`]: the two RPCs the resolver needs and their CDP binding.
//! - [`evaluate`]: expression evaluation feeding the resolver.
//! - [`replay`]: a channel that answers from recorded transcripts.

pub mod evaluate;
pub mod protocol;
pub mod remote;
pub mod replay;
pub mod resolver;
pub mod value;

pub use evaluate::Evaluator;
pub use protocol::{CdpRuntime, CommandChannel, RemoteRuntime};
pub use remote::{PropertyDescriptor, RemoteObject, Shape, ValueKind};
pub use replay::{ReplayChannel, Transcript};
pub use resolver::Resolver;
pub use value::{LocalValue, ObjectId, PropertyMap, Resolved, CYCLIC_SENTINEL};
