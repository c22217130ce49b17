pub mod ai;
pub mod arena;
pub mod collision;
pub mod input;
pub mod physics;
