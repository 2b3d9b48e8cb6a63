pub mod accumulator;
pub mod agent;
pub mod config;
pub mod context;
pub mod errors;
pub mod models;
pub mod project;
pub mod prompt_template;
pub mod protocol;
pub mod providers;
pub mod systems;
pub mod workspace;
