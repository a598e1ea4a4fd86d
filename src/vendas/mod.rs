// src/vendas/mod.rs

pub mod vendas_structs;
pub mod vendas_router;
// Agrupamento de itens e cálculo de totais
pub mod calculo_venda;
