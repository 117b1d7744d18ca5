pub mod api;
pub mod codec;
pub mod conf;
pub mod config;
pub mod engine;
pub mod humanize;
pub mod manifest;
pub mod observability;
pub mod reconstructor;
pub mod records;
pub mod repair;
pub mod storage;
