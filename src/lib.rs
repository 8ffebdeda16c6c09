pub mod cli;
pub mod commands;
pub mod peakvar;
pub mod utils;
