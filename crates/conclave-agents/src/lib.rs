//! Conclave agents: the async half of the consensus engine.
//!
//! - [`adapters`]: remote HTTP and local process providers behind one trait
//! - [`dispatcher`]: bounded, retrying, cancellable fan-out
//! - [`debate`]: drives the three debate rounds through the dispatcher
//! - [`engine`]: the tool facade handed to a transport
//! - [`telemetry`]: tracing subscriber setup

pub mod adapters;
pub mod debate;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod telemetry;

pub use adapters::{
    Adapter, AdapterFactory, Credentials, DefaultAdapterFactory, ProcessAdapter, ProviderAdapter,
    RemoteAdapter,
};
pub use debate::{DebateDriver, DebatePlan};
pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use errors::EngineError;
