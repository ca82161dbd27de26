//! Authentication core: staged signups with one-time codes, signin,
//! password reset, and stateless session tokens.

pub mod password;
pub mod reset;
pub mod session;
pub mod signup;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod token;
pub mod types;
pub mod utils;
pub mod verification;

pub use state::{AuthConfig, AuthState};
pub use sweeper::SweepSettings;
