pub mod config;
pub mod fs;
pub mod geometry;
pub mod palette;
pub mod renderer;
pub mod sprites;
