pub mod context;
pub mod element;
pub mod error;
pub mod history;
pub mod ids;
pub mod input;
pub mod window;
