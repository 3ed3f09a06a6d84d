pub mod agent;
pub mod developer;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod registry;
pub mod systems;
