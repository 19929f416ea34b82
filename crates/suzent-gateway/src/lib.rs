pub mod app;
pub mod http;

pub use app::{build_router, AppState, ProviderCompletion};
