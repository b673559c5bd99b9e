//! Module implementing the clipstore API webserver.
//!
//! The main server application is implemented in the [`App`] struct, which sets up routing and
//! middleware. It is a tower service that can be run using any compatible server framework.
//!
//! To listen to incoming connections, use the [`server()`] function, which opens a TCP listener
//! and serves the application until a termination signal arrives.
//!
//! # Testing
//!
//! For end-to-end tests of the server, see the `clipstore-test` crate, which provides utilities
//! to start a test server.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;
