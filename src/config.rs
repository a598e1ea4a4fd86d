// src/config.rs

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Chave usada apenas em desenvolvimento quando `JWT_SECRET` não foi definido.
const CHAVE_JWT_DESENVOLVIMENTO: &str = "chave-de-desenvolvimento-nao-usar-em-producao-123";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("variável de ambiente obrigatória ausente: {0}")]
    Ausente(&'static str),

    #[error("valor inválido para {variavel}: {valor}")]
    Invalida { variavel: &'static str, valor: String },

    #[error("JWT_SECRET deve ter pelo menos 32 caracteres em produção")]
    SegredoFraco,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ambiente {
    Desenvolvimento,
    Producao,
}

/// Configuração da aplicação, lida do ambiente (e do `.env`, se existir).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// `JWT_SECRET` ausente em desenvolvimento: usando a chave embutida.
    pub jwt_secret_provisorio: bool,
    pub host: String,
    pub port: u16,
    pub ambiente: Ambiente,
    pub db_max_connections: u32,
    pub token_expiration_hours: i64,
    pub import_batch_size: usize,
    pub upload_dir: PathBuf,
    pub admin_username: String,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // O .env é opcional
        let _ = dotenv::dotenv();

        let ambiente = match env::var("APP_ENV").unwrap_or_else(|_| "development".into()).as_str() {
            "production" | "producao" => Ambiente::Producao,
            "development" | "desenvolvimento" => Ambiente::Desenvolvimento,
            outro => {
                return Err(ConfigError::Invalida { variavel: "APP_ENV", valor: outro.to_string() });
            }
        };

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Ausente("DATABASE_URL"))?;

        let (jwt_secret, jwt_secret_provisorio) = resolver_segredo(ambiente, env::var("JWT_SECRET").ok())?;

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_secret_provisorio,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: ler_numero("PORT", 8080)?,
            ambiente,
            db_max_connections: ler_numero("DB_MAX_CONNECTIONS", 10)?,
            token_expiration_hours: ler_numero("TOKEN_EXPIRATION_HOURS", 24)?,
            import_batch_size: ler_numero::<usize>("IMPORT_BATCH_SIZE", 100)?.max(1),
            upload_dir: PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into())),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
        })
    }

    pub fn desenvolvimento(&self) -> bool {
        self.ambiente == Ambiente::Desenvolvimento
    }

    #[cfg(test)]
    pub fn para_testes(database_url: &str, jwt_secret: &str) -> Self {
        Config {
            database_url: database_url.to_string(),
            jwt_secret: jwt_secret.to_string(),
            jwt_secret_provisorio: false,
            host: "127.0.0.1".into(),
            port: 8080,
            ambiente: Ambiente::Desenvolvimento,
            db_max_connections: 2,
            token_expiration_hours: 24,
            import_batch_size: 100,
            upload_dir: PathBuf::from("uploads"),
            admin_username: "admin".into(),
            admin_password: None,
        }
    }
}

/// Devolve o segredo e se ele é a chave de desenvolvimento.
fn resolver_segredo(ambiente: Ambiente, segredo: Option<String>) -> Result<(String, bool), ConfigError> {
    match segredo {
        Some(segredo) if ambiente == Ambiente::Producao && segredo.len() < 32 => Err(ConfigError::SegredoFraco),
        Some(segredo) => Ok((segredo, false)),
        None if ambiente == Ambiente::Desenvolvimento => Ok((CHAVE_JWT_DESENVOLVIMENTO.to_string(), true)),
        None => Err(ConfigError::Ausente("JWT_SECRET")),
    }
}

fn ler_numero<T: std::str::FromStr>(variavel: &'static str, padrao: T) -> Result<T, ConfigError> {
    match env::var(variavel) {
        Ok(valor) => valor
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalida { variavel, valor }),
        Err(_) => Ok(padrao),
    }
}
