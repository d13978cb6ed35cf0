pub mod cache;
pub mod config;
pub mod controller;
pub mod llm;
pub mod memory;
pub mod retrieval;
pub mod security;
pub mod shared;
pub mod tools;
pub mod workflow;
