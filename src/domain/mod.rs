pub mod clock;
pub mod entities;
pub mod errors;
pub mod repositories;
pub mod services;
