#![allow(dead_code)]

pub mod timeline;
pub mod wav;
