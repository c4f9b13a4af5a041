pub mod auth;
pub mod lock;
pub mod profile;
pub mod sync;
pub mod tree;
