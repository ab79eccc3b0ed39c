mod handler;
pub mod model;

pub use handler::{admin_login, login, signup, verify_otp};
