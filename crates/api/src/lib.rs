//! HTTP API: routing, authentication middleware, request contexts and the
//! service facade the handlers call into.

pub mod app;
pub mod context;
pub mod middleware;
