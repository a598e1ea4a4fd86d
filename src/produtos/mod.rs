// src/produtos/mod.rs

pub mod produtos_structs;
pub mod produtos_router;
// Leitura da planilha e geração do modelo
pub mod planilha;
// Reconciliação das linhas importadas com o catálogo
pub mod importacao;
pub mod importacao_router;
