pub mod advice;
pub mod models;
mod server;
pub mod services;

pub use server::{app, run};
