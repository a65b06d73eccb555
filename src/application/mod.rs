//! Application services: rendering, engine bootstrap, and the sandbox
//! message channel.

pub mod bootstrap;
pub mod error;
pub mod render;
pub mod sandbox;
pub mod search;
