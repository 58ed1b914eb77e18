pub mod conflict;
pub mod cursor;
pub mod mirror;
pub mod session;
