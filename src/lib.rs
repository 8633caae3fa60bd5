pub mod app;
pub mod checksum;
pub mod compression;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod grouping;
pub mod naming;
pub mod output;
pub mod pairing;
pub mod qc;
pub mod rollback;
pub mod store;
pub mod upload;
