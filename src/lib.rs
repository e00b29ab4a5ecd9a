pub mod charts;
pub mod config;
pub mod driver;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod segmenter;
pub mod session;
pub mod sink;
pub mod types;

#[cfg(test)]
mod testing;
