pub mod notification;
pub mod project;
pub mod role;
pub mod user;
