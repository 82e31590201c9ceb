pub mod path;
pub mod planner;
