//! Bike Gear Storefront
//!
//! Serves the helmets page (`/`, `/index.html`) and the glasses page
//! (`/glasses.html`) with a JSON health check and an HTML 404 fallback.

pub mod server;
pub mod static_files;

pub use server::SiteServer;
pub use static_files::StaticFiles;
