pub mod services;
pub mod strategies;
