// src/usuarios/mod.rs

// Declara o submódulo que contém as definições das structs de usuários
pub mod usuario_structs;
// Declara o submódulo que contém as funções de rota relacionadas a usuários
pub mod usuario_router;
// Extrator de autenticação (token Bearer)
pub mod auth_middleware;
// Emissão e validação de tokens
pub mod jwt;
// Papéis, permissões e reparo das flags salvas
pub mod permissoes;
