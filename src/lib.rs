pub mod bookmarks;
pub mod sync;
