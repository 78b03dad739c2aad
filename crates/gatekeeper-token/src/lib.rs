pub mod manager;

pub use manager::TokenManager;
