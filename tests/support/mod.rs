#![allow(dead_code)]

pub mod chain;
pub mod fixtures;
pub mod wait;
