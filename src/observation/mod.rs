pub mod classifier;
pub mod normalize;
pub mod observation_model;
