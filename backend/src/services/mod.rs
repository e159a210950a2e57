pub mod sync_service;
pub mod scheduler;

pub use sync_service::SyncService;
pub use scheduler::SyncScheduler;
