pub mod app;
pub mod archive;
pub mod config;
pub mod crs;
pub mod dataset;
pub mod domain;
pub mod encoder;
pub mod error;
pub mod extract;
pub mod output;
pub mod serialize;
pub mod table;
pub mod workspace;
