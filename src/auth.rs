//! Client identities, credential resolution, secrets, and token models.

pub mod identity;
pub mod resolver;
pub mod secret;
pub mod token;

pub use identity::*;
pub use resolver::*;
pub use secret::*;
pub use token::*;
