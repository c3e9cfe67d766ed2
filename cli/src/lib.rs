//! label-mod CLI: edit the labels of images that live in a registry.

pub mod commands;
pub mod output;
