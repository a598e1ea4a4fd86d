// src/estoque/mod.rs

// Saldo derivado (conferido - perdas - vendido) e bloqueio de produto
pub mod contabilidade;
pub mod estoque_structs;
pub mod estoque_router;
