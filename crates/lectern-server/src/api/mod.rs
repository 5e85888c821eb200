//! API routes and handlers.

pub mod ai;
pub mod principal;
pub mod profiles;
pub mod references;
mod router;
pub mod stream;
pub mod ws;

pub use router::create_router;
