// src/usuarios/jwt.rs

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::usuario_structs::Claims;
use crate::shared::erro::AppError;

/// Gera o token de acesso de um usuário.
pub fn gerar_token(
    segredo: &str,
    usuario_id: i32,
    username: &str,
    role: &str,
    validade_horas: i64,
) -> Result<String, AppError> {
    let agora = Utc::now();
    let claims = Claims {
        sub: usuario_id,
        username: username.to_string(),
        role: role.to_string(),
        iat: agora.timestamp(),
        exp: (agora + Duration::hours(validade_horas)).timestamp(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(segredo.as_bytes()))
        .map_err(|e| AppError::interno(format!("Falha ao gerar token: {}", e)))
}

/// Decodifica e valida o token (assinatura e expiração).
pub fn validar_token(segredo: &str, token: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &DecodingKey::from_secret(segredo.as_bytes()), &validation)
        .map(|dados| dados.claims)
        .map_err(|e| {
            let mensagem = match e.kind() {
                ErrorKind::ExpiredSignature => "Token expirado.",
                ErrorKind::InvalidSignature => "Assinatura do token inválida.",
                ErrorKind::InvalidToken => "Token malformado.",
                _ => "Token de autenticação inválido.",
            };
            AppError::nao_autenticado(mensagem)
        })
}

/// Extrai o token de um cabeçalho `Authorization: Bearer <token>`.
pub fn extrair_bearer(cabecalho: &str) -> Option<&str> {
    cabecalho
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
