pub mod artifact;
pub mod recorder;
pub mod template;
pub mod transition_graph;
pub mod transition_model;
