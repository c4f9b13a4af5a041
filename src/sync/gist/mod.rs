mod client;

pub use client::{GistClient, GistProvider};
