pub mod config;
pub mod errors;
pub mod nms_utils;
