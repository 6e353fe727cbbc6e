pub mod cli;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod stream;
pub mod waveform;
