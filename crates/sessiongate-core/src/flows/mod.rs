//! User-facing auth flows: login, signup, password reset/update, logout.
//!
//! Each flow turns one user action into a typed outcome carrying the text
//! to show. Only transport plumbing is logged; outcomes are returned.

pub mod login;
pub mod logout;
pub mod password;
pub mod signup;

pub use login::{LoginFlow, LoginOutcome};
pub use logout::LogoutFlow;
pub use password::{PasswordFlow, ResetOutcome, UpdateOutcome};
pub use signup::{SignupFlow, SignupOutcome};
