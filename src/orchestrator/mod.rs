pub mod forge;
pub mod session;

pub use forge::ForgeOrchestrator;
pub use session::SessionStore;
