pub mod hello;
pub mod info;
