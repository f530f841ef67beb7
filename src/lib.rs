pub mod config;
pub mod ir;
pub mod logging;
pub mod pipeline;

pub use config::RewriterConfig;
pub use pipeline::{Pipeline, PipelineReport};
