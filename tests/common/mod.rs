#![allow(dead_code)]

pub mod screens;
pub mod utils;
