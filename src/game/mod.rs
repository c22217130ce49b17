pub mod constants;
pub mod game_loop;
pub mod physics;
pub mod snapshot;
pub mod state;
pub mod systems;
