//! Resource serving: lookup, dispatch, HTTP handlers and named methods

pub mod dispatcher;
pub mod handlers;
pub mod methods;
pub mod query;
pub mod registry;

pub use dispatcher::{Address, Dispatcher, Reply};
pub use handlers::{AppState, resource_routes};
pub use methods::{MethodContext, MethodHandler, MethodRegistry, handler_fn};
pub use query::{Cursor, QueryParams};
pub use registry::ResourceRegistry;
