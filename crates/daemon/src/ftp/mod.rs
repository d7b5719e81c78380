//! File transfer service collaborators.
//!
//! - [`authorizer`]: virtual user table and permission letters
//! - [`engine`]: the engine seam driven by the lifecycle controller

pub mod authorizer;
pub mod engine;

pub use authorizer::{AuthError, Authorizer};
pub use engine::{
    BannerSession, ClientSession, EngineError, EngineFactory, EngineSettings, SessionHandler,
    TcpEngine, TcpEngineFactory, TransferEngine,
};
