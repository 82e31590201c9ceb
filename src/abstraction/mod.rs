pub mod abstract_state;
pub mod granularity;
pub mod reducer;
pub mod resolver;
pub mod state_store;
