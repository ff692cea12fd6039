pub mod config;
pub mod console;
pub mod database;
pub mod logger;
pub mod platform;
pub mod system;
pub mod system_tasks;
pub mod web;
