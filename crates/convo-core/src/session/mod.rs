pub mod repository;
pub mod service;

pub use repository::SessionRepository;
pub use service::SessionService;
