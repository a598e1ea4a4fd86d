// src/usuarios/auth_middleware.rs

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use tracing::warn;

use super::jwt::{extrair_bearer, validar_token};
use super::permissoes::{permite, Papel, Permissao, Permissoes};
use super::usuario_structs::{Usuario, COLUNAS_USUARIO};
use crate::shared::erro::AppError;
use crate::AppState;

/// Usuário autenticado da requisição.
///
/// Extraído de rotas protegidas: valida o token `Bearer` e recarrega o usuário
/// do banco, de modo que exclusões e mudanças de permissão valem na hora.
#[derive(Debug, Clone)]
pub struct UsuarioAutenticado {
    pub id: i32,
    pub username: String,
    pub papel: Papel,
    pub permissoes: Permissoes,
}

impl UsuarioAutenticado {
    pub fn pode(&self, permissao: Permissao) -> bool {
        permite(self.papel, &self.permissoes, permissao)
    }

    /// Falha com 403 se o usuário não tiver a permissão.
    pub fn exigir(&self, permissao: Permissao) -> Result<(), AppError> {
        if self.pode(permissao) {
            Ok(())
        } else {
            warn!(usuario_id = self.id, username = %self.username, permissao = permissao.chave(), "Acesso negado");
            Err(AppError::proibido(format!("Permissão '{}' necessária.", permissao.chave())))
        }
    }

    /// Somente admin ou manager.
    pub fn exigir_gestor(&self) -> Result<(), AppError> {
        if self.papel.gestor() {
            Ok(())
        } else {
            warn!(usuario_id = self.id, username = %self.username, "Acesso de gestor negado");
            Err(AppError::proibido("Acesso restrito a administradores e gerentes."))
        }
    }

    pub fn exigir_admin(&self) -> Result<(), AppError> {
        if self.papel == Papel::Admin {
            Ok(())
        } else {
            warn!(usuario_id = self.id, username = %self.username, "Acesso de administrador negado");
            Err(AppError::proibido("Acesso restrito a administradores."))
        }
    }
}

impl FromRequest for UsuarioAutenticado {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let app_state = req.app_data::<web::Data<AppState>>().cloned();
        let auth_header = req
            .headers()
            .get(header::AUTHORIZATION)
            .map(|valor| valor.to_str().map(str::to_owned));

        Box::pin(async move {
            let state = app_state.ok_or_else(|| AppError::interno("AppState não registrado"))?;

            let cabecalho = match auth_header {
                Some(Ok(valor)) => valor,
                Some(Err(_)) => return Err(AppError::nao_autenticado("Token de autenticação inválido.")),
                None => return Err(AppError::nao_autenticado("Token de autenticação ausente.")),
            };

            let token = extrair_bearer(&cabecalho).ok_or_else(|| {
                AppError::nao_autenticado("Formato de token inválido. Esperado 'Bearer <token>'.")
            })?;

            let claims = validar_token(&state.config.jwt_secret, token)?;

            let usuario = sqlx::query_as::<_, Usuario>(&format!(
                "SELECT {} FROM users WHERE id = $1",
                COLUNAS_USUARIO
            ))
            .bind(claims.sub)
            .fetch_optional(&state.db_pool)
            .await?
            .ok_or_else(|| AppError::nao_autenticado("Usuário do token não existe mais."))?;

            Ok(UsuarioAutenticado {
                id: usuario.id,
                papel: usuario.papel()?,
                permissoes: usuario.permissions.0.normalizada(),
                username: usuario.username,
            })
        })
    }
}
