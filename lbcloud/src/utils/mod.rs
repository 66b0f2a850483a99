pub mod cli;
pub mod identifier;
pub mod state;
pub mod validation;
