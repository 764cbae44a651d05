mod alerts;
mod health;
mod ingest;
mod metrics;
mod server;
mod ws;

pub use server::{router, serve, AppState};
