//! Tool executor (§4.4): registry lookup, sandbox/permission enforcement,
//! invocation and output persistence.

pub mod executor;
pub mod persister;

pub use executor::Executor;
pub use persister::{FileOutputPersister, OutputPersister};
