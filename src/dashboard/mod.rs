// src/dashboard/mod.rs

pub mod dashboard_structs;
pub mod dashboard_router;
