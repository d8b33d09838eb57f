pub mod config;
pub mod error;
pub mod types;

pub use config::ChartguardConfig;
pub use error::{CoreError, CoreResult};
pub use types::{AuthResponse, SessionStatus, UserInfo};
