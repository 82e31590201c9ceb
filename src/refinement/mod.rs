pub mod controller;
pub mod rebuild;
