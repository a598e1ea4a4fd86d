// src/shared/erro.rs

//! Erro único da aplicação.
//!
//! Toda rota devolve `Result<HttpResponse, AppError>`; a conversão para a
//! resposta JSON `{error, details?}` acontece em `ResponseError`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use super::shared_structs::ErroResponse;

static MODO_DESENVOLVIMENTO: OnceLock<bool> = OnceLock::new();

/// Define uma única vez se as mensagens de erros internos podem ser expostas.
pub fn definir_modo_desenvolvimento(ativo: bool) {
    let _ = MODO_DESENVOLVIMENTO.set(ativo);
}

fn modo_desenvolvimento() -> bool {
    MODO_DESENVOLVIMENTO.get().copied().unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum AppError {
    // ========== Erros de entrada (400) ==========
    #[error("{mensagem}")]
    Validacao {
        mensagem: String,
        detalhes: Option<Value>,
    },

    #[error("{0}")]
    RegraNegocio(String),

    #[error("Estoque insuficiente para o produto {produto}: solicitado {solicitado}, disponível {disponivel}")]
    EstoqueInsuficiente {
        produto_id: i32,
        produto: String,
        solicitado: i64,
        disponivel: i64,
    },

    #[error("Cliente {cliente_id} inativo: adesão expirada")]
    ClienteInativo { cliente_id: i32 },

    // ========== Autenticação e autorização ==========
    #[error("{0}")]
    NaoAutenticado(String),

    #[error("{0}")]
    Proibido(String),

    // ========== Recursos ==========
    #[error("{0}")]
    NaoEncontrado(String),

    #[error("Cliente {0} não encontrado")]
    ClienteNaoEncontrado(i32),

    #[error("{0}")]
    Conflito(String),

    // ========== Sistema (500) ==========
    #[error("Erro de banco de dados: {0}")]
    Banco(#[from] sqlx::Error),

    #[error("{0}")]
    Interno(String),
}

impl AppError {
    pub fn validacao(mensagem: impl Into<String>) -> Self {
        AppError::Validacao { mensagem: mensagem.into(), detalhes: None }
    }

    pub fn regra_negocio(mensagem: impl Into<String>) -> Self {
        AppError::RegraNegocio(mensagem.into())
    }

    pub fn nao_autenticado(mensagem: impl Into<String>) -> Self {
        AppError::NaoAutenticado(mensagem.into())
    }

    pub fn proibido(mensagem: impl Into<String>) -> Self {
        AppError::Proibido(mensagem.into())
    }

    pub fn nao_encontrado(mensagem: impl Into<String>) -> Self {
        AppError::NaoEncontrado(mensagem.into())
    }

    pub fn conflito(mensagem: impl Into<String>) -> Self {
        AppError::Conflito(mensagem.into())
    }

    pub fn interno(mensagem: impl Into<String>) -> Self {
        AppError::Interno(mensagem.into())
    }

    fn detalhes(&self) -> Option<Value> {
        match self {
            AppError::Validacao { detalhes, .. } => detalhes.clone(),
            AppError::EstoqueInsuficiente { produto_id, produto, solicitado, disponivel } => Some(json!({
                "produto_id": produto_id,
                "produto": produto,
                "solicitado": solicitado,
                "disponivel": disponivel,
            })),
            AppError::ClienteInativo { cliente_id } => Some(json!({ "cliente_id": cliente_id })),
            _ => None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validacao { .. }
            | AppError::RegraNegocio(_)
            | AppError::EstoqueInsuficiente { .. }
            | AppError::ClienteInativo { .. } => StatusCode::BAD_REQUEST,
            AppError::NaoAutenticado(_) => StatusCode::UNAUTHORIZED,
            AppError::Proibido(_) => StatusCode::FORBIDDEN,
            AppError::NaoEncontrado(_) | AppError::ClienteNaoEncontrado(_) => StatusCode::NOT_FOUND,
            AppError::Conflito(_) => StatusCode::CONFLICT,
            AppError::Banco(_) | AppError::Interno(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let mensagem = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(erro = %self, "Erro interno ao processar requisição");
            if modo_desenvolvimento() {
                self.to_string()
            } else {
                "Erro interno do servidor".to_string()
            }
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(ErroResponse {
            error: mensagem,
            details: self.detalhes(),
        })
    }
}

/// Verdadeiro quando o erro do banco é uma violação de unicidade (SQLSTATE 23505).
pub fn violacao_unicidade(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

// ========== Conversões de erros de bibliotecas ==========

impl From<validator::ValidationErrors> for AppError {
    fn from(erros: validator::ValidationErrors) -> Self {
        let mut campos: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (campo, lista) in erros.field_errors() {
            let mensagens = lista
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("valor inválido ({})", e.code))
                })
                .collect();
            campos.insert(campo.to_string(), mensagens);
        }

        AppError::Validacao {
            mensagem: "Dados inválidos".to_string(),
            detalhes: Some(json!(campos)),
        }
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        AppError::validacao(format!("Erro no upload multipart: {}", e))
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        AppError::interno(format!("Tarefa bloqueante cancelada: {}", e))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::interno(format!("Erro ao processar senha: {}", e))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::interno(format!("Erro de E/S: {}", e))
    }
}

// ========== Handlers dos extratores do actix ==========

pub fn erro_json(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validacao(format!("JSON inválido: {}", err)).into()
}

pub fn erro_query(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validacao(format!("Parâmetros de consulta inválidos: {}", err)).into()
}

pub fn erro_path(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validacao(format!("Parâmetro de rota inválido: {}", err)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn corpo(erro: AppError) -> (StatusCode, Value) {
        let resposta = erro.error_response();
        let status = resposta.status();
        let bytes = to_bytes(resposta.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn estoque_insuficiente_informa_quantidades() {
        let (status, json) = corpo(AppError::EstoqueInsuficiente {
            produto_id: 7,
            produto: "Caneta azul".to_string(),
            solicitado: 5,
            disponivel: 3,
        })
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Caneta azul"));
        assert_eq!(json["details"]["solicitado"], 5);
        assert_eq!(json["details"]["disponivel"], 3);
    }

    #[actix_web::test]
    async fn erro_interno_nao_vaza_mensagem_fora_do_desenvolvimento() {
        let (status, json) = corpo(AppError::interno("senha do banco: hunter2")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Erro interno do servidor");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn mapeia_status_por_categoria() {
        assert_eq!(AppError::nao_autenticado("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::proibido("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::ClienteNaoEncontrado(1).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflito("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::ClienteInativo { cliente_id: 1 }.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn erros_do_validator_viram_detalhes_por_campo() {
        use validator::Validate;

        #[derive(Validate)]
        struct Entrada {
            #[validate(length(min = 3, message = "mínimo de 3 caracteres"))]
            nome: String,
        }

        let erro: AppError = Entrada { nome: "a".into() }.validate().unwrap_err().into();
        match erro {
            AppError::Validacao { detalhes: Some(detalhes), .. } => {
                assert_eq!(detalhes["nome"][0], "mínimo de 3 caracteres");
            }
            outro => panic!("esperava Validacao, veio {:?}", outro),
        }
    }
}
