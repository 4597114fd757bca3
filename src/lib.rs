pub mod config;
pub mod dom;
pub mod editor;
pub mod error;
pub mod identity;
pub mod inline;
pub mod page;
pub mod render;
pub mod revision;
pub mod router;
pub mod search;
pub mod storage;

#[cfg(test)]
mod test_support;
