//! API route organization by domain.
//!
//! Each domain exposes a function returning a `Router<Arc<AppState>>`; the
//! sub-routers are merged into the application router in `lib.rs`.

pub mod sessions;
pub mod ssh;
