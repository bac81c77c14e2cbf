//! Command lifecycle, events and collaborator seams

pub mod command;
pub mod event;
pub mod listener;
