// Core models
pub mod achievement;
pub mod match_model;
pub mod notification;
pub mod player;
pub mod tournament;

// Re-export commonly used types
pub use achievement::*;
pub use match_model::*;
pub use notification::*;
pub use player::*;
pub use tournament::*;
