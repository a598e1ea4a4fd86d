// src/shared/mod.rs

// Data corrente segundo o banco
pub mod datas;
// Tipos de erro comuns a todas as rotas
pub mod erro;
// Inicialização do tracing
pub mod logger;
// Estruturas de resposta e paginação compartilhadas
pub mod shared_structs;
