//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handler dispatch)
//!     → request.rs (request ID, token extraction)
//!     → engine::DecisionEngine::authorize
//!     → response.rs (decision headers, check result)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, TOKEN_HEADER, X_REQUEST_ID};
pub use server::{build_router, AppState, HttpServer};
