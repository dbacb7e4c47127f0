pub mod handler;
pub mod model;

pub use handler::{delete_me, disable, enable, login, logout, me};
