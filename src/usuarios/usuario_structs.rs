// src/usuarios/usuario_structs.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

use super::permissoes::{Papel, Permissoes};
use crate::shared::erro::AppError;

/// Estrutura que representa um usuário no banco de dados.
/// A senha é armazenada como hash bcrypt.
#[derive(Debug, FromRow)]
pub struct Usuario {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub permissions: Json<Permissoes>,
    pub foto: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Colunas lidas em toda consulta de `Usuario`.
pub const COLUNAS_USUARIO: &str = "id, username, password_hash, role, permissions, foto, created_at";

impl Usuario {
    pub fn papel(&self) -> Result<Papel, AppError> {
        Papel::from_db(&self.role)
            .ok_or_else(|| AppError::interno(format!("Papel desconhecido no banco: {}", self.role)))
    }

    pub fn para_resposta(&self) -> Result<UsuarioResponse, AppError> {
        let papel = self.papel()?;
        Ok(UsuarioResponse {
            id: self.id,
            username: self.username.clone(),
            role: papel,
            permissions: self.permissions.0.efetivas(papel),
            foto: self.foto.clone(),
            created_at: self.created_at,
        })
    }
}

/// Usuário como exposto pela API (nunca inclui o hash).
#[derive(Debug, Serialize)]
pub struct UsuarioResponse {
    pub id: i32,
    pub username: String,
    pub role: Papel,
    pub permissions: Permissoes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foto: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload do JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,         // ID do usuário
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,         // Expiração (timestamp Unix)
}

/// Nomes de usuário chegam aparados, antes de qualquer validação de tamanho.
fn aparar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    String::deserialize(deserializer).map(|s| s.trim().to_string())
}

fn aparar_opcional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<String>::deserialize(deserializer).map(|s| s.map(|s| s.trim().to_string()))
}

/// Dados de login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(deserialize_with = "aparar")]
    #[validate(length(min = 1, message = "Usuário é obrigatório"))]
    pub username: String,
    #[validate(length(min = 1, message = "Senha é obrigatória"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UsuarioResponse,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UsuarioResponse,
}

/// Cadastro de usuário (somente admin/manager).
#[derive(Debug, Deserialize, Validate)]
pub struct NovoUsuario {
    #[serde(deserialize_with = "aparar")]
    #[validate(length(min = 3, max = 50, message = "Usuário deve ter entre 3 e 50 caracteres"))]
    pub username: String,
    #[validate(length(min = 6, max = 128, message = "Senha deve ter entre 6 e 128 caracteres"))]
    pub password: String,
    pub role: Papel,
    #[serde(default)]
    pub permissions: Option<Permissoes>,
}

/// Atualização parcial de usuário.
#[derive(Debug, Deserialize, Validate)]
pub struct AtualizarUsuario {
    #[serde(default, deserialize_with = "aparar_opcional")]
    #[validate(length(min = 3, max = 50, message = "Usuário deve ter entre 3 e 50 caracteres"))]
    pub username: Option<String>,
    #[validate(length(min = 6, max = 128, message = "Senha deve ter entre 6 e 128 caracteres"))]
    pub password: Option<String>,
    pub role: Option<Papel>,
    pub permissions: Option<Permissoes>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AlterarSenhaRequest {
    #[validate(length(min = 1, message = "Senha atual é obrigatória"))]
    pub senha_atual: String,
    #[validate(length(min = 6, max = 128, message = "Nova senha deve ter entre 6 e 128 caracteres"))]
    pub nova_senha: String,
}
