pub mod app;
pub mod config;
pub mod domain;
pub mod entrez;
pub mod error;
pub mod export;
pub mod fs_util;
pub mod ledger;
pub mod loader;
pub mod output;
pub mod record;
pub mod summary;
