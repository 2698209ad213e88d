//! Runnable surface for the gatehouse intake workflow: a clap CLI with a
//! keep-alive HTTP server and a scripted end-to-end demo.
//!
//! The chat platform is reached through the gateway traits in `gatehouse`;
//! this service wires in-memory adapters, which is enough for the HTTP
//! surface, the demo, and tests. A production deployment supplies a real
//! client adapter in their place.

mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use gatehouse::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
