// src/lib.rs

//! Contest Standings Library

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rating;
pub mod services;
pub mod storage;
pub mod utils;
