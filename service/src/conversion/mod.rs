pub mod context;
pub mod pipeline;
pub mod service;
pub mod steps;
