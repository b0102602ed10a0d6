pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod fs_util;
pub mod layout;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod planner;
pub mod publish;
pub mod stager;
pub mod store;
pub mod unpack;
