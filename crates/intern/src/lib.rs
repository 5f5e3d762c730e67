pub mod agent;
pub mod assistants;
pub mod coordinator;
pub mod errors;
pub mod exa;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod session;
pub mod store;
pub mod systems;
pub mod team;
