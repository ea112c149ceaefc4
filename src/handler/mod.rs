//! Handler functions: how they are registered, their defaults and their resolution.

pub mod default;
pub mod function;
pub mod module;
pub mod resolve;
