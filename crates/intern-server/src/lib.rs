pub mod configuration;
pub mod error;
pub mod routes;
pub mod state;
pub mod tool_data;
