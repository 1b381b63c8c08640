pub mod catalog;
pub mod cli;
pub mod config;
pub mod export;
pub mod import;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod review;
pub mod standardize;
pub mod util;

pub mod error;
