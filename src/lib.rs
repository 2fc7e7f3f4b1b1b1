pub mod canonical;
pub mod classifier;
pub mod cli;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod dedup;
pub mod error;
pub mod frontier;
pub mod http;
pub mod keywords;
pub mod minhash;
pub mod monitoring;
pub mod parser;
pub mod robots;
pub mod scorer;
pub mod sitemap;
pub mod storage;
pub mod telemetry;
