//! Repositories for database operations

pub mod admin;
pub mod page;
pub mod visit;

pub use admin::AdminRepository;
pub use page::PageRepository;
pub use visit::VisitRepository;
