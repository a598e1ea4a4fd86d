// src/clientes/mod.rs

pub mod clientes_structs;
pub mod clientes_router;
pub mod cpf;
