pub mod cli;
pub mod config;
pub mod kmeans;
pub mod pixels;
pub mod render;
pub mod utils;

pub use config::Opts;
pub use kmeans::{ClusterResult, ClusterState, KMeansError, Termination};
pub use pixels::PixelSet;
