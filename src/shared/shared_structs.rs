// src/shared/shared_structs.rs

use serde::{Deserialize, Serialize};

/// Corpo padrão das respostas de erro da API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErroResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")] // Não serializa 'details' se for None
    pub details: Option<serde_json::Value>,
}

/// Resposta simples com uma mensagem de confirmação.
#[derive(Debug, Serialize)]
pub struct MensagemResponse {
    pub message: String,
}

impl MensagemResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Limite máximo de itens por página em qualquer listagem.
pub const LIMITE_MAXIMO_PAGINA: i64 = 100;

/// Parâmetros de paginação aceitos nas listagens (`?page=&limit=`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Paginacao {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Paginacao {
    /// Página (a partir de 1) e limite já saneados.
    pub fn normalizar(&self) -> (i64, i64) {
        let pagina = self.page.unwrap_or(1).max(1);
        let limite = self.limit.unwrap_or(20).clamp(1, LIMITE_MAXIMO_PAGINA);
        (pagina, limite)
    }

    /// Deslocamento correspondente para o `OFFSET` do SQL.
    pub fn offset(&self) -> i64 {
        let (pagina, limite) = self.normalizar();
        (pagina - 1) * limite
    }
}

/// Resposta paginada genérica.
#[derive(Debug, Serialize)]
pub struct PaginaResponse<T> {
    pub dados: Vec<T>,
    pub pagina: i64,
    pub limite: i64,
    pub total: i64,
    pub total_paginas: i64,
}

impl<T> PaginaResponse<T> {
    pub fn new(dados: Vec<T>, paginacao: &Paginacao, total: i64) -> Self {
        let (pagina, limite) = paginacao.normalizar();
        let total_paginas = (total + limite - 1) / limite;
        Self { dados, pagina, limite, total, total_paginas }
    }
}
