// src/usuarios/usuario_router.rs

use actix_multipart::Multipart;
use actix_web::{delete, get, post, put, web, HttpResponse};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use futures::TryStreamExt;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};
use validator::Validate;

use super::auth_middleware::UsuarioAutenticado;
use super::jwt::gerar_token;
use super::permissoes::{Papel, Permissoes};
use super::usuario_structs::{
    AlterarSenhaRequest, AtualizarUsuario, LoginRequest, LoginResponse, NovoUsuario, Usuario,
    UsuarioResponse, VerifyResponse, COLUNAS_USUARIO,
};
use crate::config::Config;
use crate::shared::erro::{violacao_unicidade, AppError};
use crate::shared::shared_structs::MensagemResponse;
use crate::AppState;

/// Tamanho máximo da foto de usuário (5MB).
const TAMANHO_MAXIMO_FOTO: usize = 5 * 1024 * 1024;
const FORMATOS_FOTO: &[&str] = &["png", "jpg", "jpeg", "webp"];

async fn gerar_hash(senha: String) -> Result<String, AppError> {
    Ok(web::block(move || hash(senha, DEFAULT_COST)).await??)
}

async fn conferir_senha(senha: String, senha_hash: String) -> Result<bool, AppError> {
    Ok(web::block(move || verify(senha, &senha_hash)).await??)
}

async fn buscar_usuario(pool: &PgPool, id: i32) -> Result<Usuario, AppError> {
    sqlx::query_as::<_, Usuario>(&format!("SELECT {} FROM users WHERE id = $1", COLUNAS_USUARIO))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::nao_encontrado(format!("Usuário {} não encontrado.", id)))
}

/// Gerentes só administram contas de funcionário.
fn verificar_alcance(gestor: &UsuarioAutenticado, papel_alvo: Papel) -> Result<(), AppError> {
    gestor.exigir_gestor()?;
    if gestor.papel == Papel::Manager && papel_alvo != Papel::Employee {
        return Err(AppError::proibido("Gerentes só podem gerenciar contas de funcionários."));
    }
    Ok(())
}

async fn contar_admins(pool: &PgPool) -> Result<i64, AppError> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Cria o administrador inicial quando a tabela de usuários está vazia.
pub async fn garantir_admin_inicial(pool: &PgPool, config: &Config) -> Result<(), AppError> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users").fetch_one(pool).await?;
    if total > 0 {
        return Ok(());
    }

    let Some(senha) = config.admin_password.clone() else {
        warn!("Nenhum usuário cadastrado e ADMIN_PASSWORD não definido; login indisponível");
        return Ok(());
    };

    let senha_hash = gerar_hash(senha).await?;
    sqlx::query("INSERT INTO users (username, password_hash, role, permissions) VALUES ($1, $2, 'admin', $3)")
        .bind(&config.admin_username)
        .bind(&senha_hash)
        .bind(Json(Permissoes::default()))
        .execute(pool)
        .await?;

    info!(username = %config.admin_username, "Administrador inicial criado");
    Ok(())
}

/// Rota de login: valida as credenciais e emite o token.
#[post("/auth/login")]
pub async fn login(
    data: web::Data<AppState>,
    login_request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let login_request = login_request.into_inner();
    login_request.validate()?;

    let usuario = sqlx::query_as::<_, Usuario>(&format!(
        "SELECT {} FROM users WHERE username = $1",
        COLUNAS_USUARIO
    ))
    .bind(&login_request.username)
    .fetch_optional(&data.db_pool)
    .await?;

    let usuario = match usuario {
        Some(u) => u,
        None => {
            warn!(username = %login_request.username, "Login com usuário inexistente");
            return Err(AppError::nao_autenticado("Credenciais inválidas."));
        }
    };

    if !conferir_senha(login_request.password, usuario.password_hash.clone()).await? {
        warn!(usuario_id = usuario.id, "Login com senha incorreta");
        return Err(AppError::nao_autenticado("Credenciais inválidas."));
    }

    let token = gerar_token(
        &data.config.jwt_secret,
        usuario.id,
        &usuario.username,
        &usuario.role,
        data.config.token_expiration_hours,
    )?;

    info!(usuario_id = usuario.id, "Login realizado");
    Ok(HttpResponse::Ok().json(LoginResponse { token, user: usuario.para_resposta()? }))
}

/// Confirma que o token ainda é válido e devolve o usuário atual.
#[get("/auth/verify")]
pub async fn verificar(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
) -> Result<HttpResponse, AppError> {
    let registro = buscar_usuario(&data.db_pool, usuario.id).await?;
    Ok(HttpResponse::Ok().json(VerifyResponse { valid: true, user: registro.para_resposta()? }))
}

#[post("/auth/users")]
pub async fn cadastrar_usuario(
    data: web::Data<AppState>,
    gestor: UsuarioAutenticado,
    novo_usuario: web::Json<NovoUsuario>,
) -> Result<HttpResponse, AppError> {
    let novo_usuario = novo_usuario.into_inner();
    novo_usuario.validate()?;
    verificar_alcance(&gestor, novo_usuario.role)?;

    let permissoes = novo_usuario.permissions.unwrap_or_default().normalizada();
    let senha_hash = gerar_hash(novo_usuario.password).await?;

    let resultado = sqlx::query_as::<_, Usuario>(&format!(
        "INSERT INTO users (username, password_hash, role, permissions) VALUES ($1, $2, $3, $4) RETURNING {}",
        COLUNAS_USUARIO
    ))
    .bind(&novo_usuario.username)
    .bind(&senha_hash)
    .bind(novo_usuario.role.as_str())
    .bind(Json(permissoes))
    .fetch_one(&data.db_pool)
    .await;

    let usuario = match resultado {
        Ok(u) => u,
        Err(e) if violacao_unicidade(&e) => {
            return Err(AppError::conflito(format!("Usuário '{}' já existe.", novo_usuario.username)));
        }
        Err(e) => return Err(e.into()),
    };

    info!(usuario_id = usuario.id, criado_por = gestor.id, role = %usuario.role, "Usuário cadastrado");
    Ok(HttpResponse::Created().json(usuario.para_resposta()?))
}

#[get("/auth/users")]
pub async fn listar_usuarios(
    data: web::Data<AppState>,
    gestor: UsuarioAutenticado,
) -> Result<HttpResponse, AppError> {
    gestor.exigir_gestor()?;

    let usuarios = sqlx::query_as::<_, Usuario>(&format!(
        "SELECT {} FROM users ORDER BY username",
        COLUNAS_USUARIO
    ))
    .fetch_all(&data.db_pool)
    .await?;

    let resposta = usuarios
        .iter()
        .map(Usuario::para_resposta)
        .collect::<Result<Vec<UsuarioResponse>, AppError>>()?;
    Ok(HttpResponse::Ok().json(resposta))
}

#[put("/auth/users/{id}")]
pub async fn atualizar_usuario(
    data: web::Data<AppState>,
    gestor: UsuarioAutenticado,
    path: web::Path<i32>,
    alteracoes: web::Json<AtualizarUsuario>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let alteracoes = alteracoes.into_inner();
    alteracoes.validate()?;

    let atual = buscar_usuario(&data.db_pool, id).await?;
    let papel_atual = atual.papel()?;
    verificar_alcance(&gestor, papel_atual)?;
    if let Some(novo_papel) = alteracoes.role {
        verificar_alcance(&gestor, novo_papel)?;
        if papel_atual == Papel::Admin && novo_papel != Papel::Admin && contar_admins(&data.db_pool).await? <= 1 {
            return Err(AppError::regra_negocio("Não é possível rebaixar o último administrador."));
        }
    }

    let senha_hash = match alteracoes.password {
        Some(senha) => Some(gerar_hash(senha).await?),
        None => None,
    };

    let resultado = sqlx::query_as::<_, Usuario>(&format!(
        "UPDATE users SET \
             username = COALESCE($1, username), \
             password_hash = COALESCE($2, password_hash), \
             role = COALESCE($3, role), \
             permissions = COALESCE($4, permissions), \
             updated_at = NOW() \
         WHERE id = $5 RETURNING {}",
        COLUNAS_USUARIO
    ))
    .bind(&alteracoes.username)
    .bind(senha_hash)
    .bind(alteracoes.role.map(|p| p.as_str()))
    .bind(alteracoes.permissions.map(|p| Json(p.normalizada())))
    .bind(id)
    .fetch_one(&data.db_pool)
    .await;

    let usuario = match resultado {
        Ok(u) => u,
        Err(e) if violacao_unicidade(&e) => return Err(AppError::conflito("Nome de usuário já está em uso.")),
        Err(e) => return Err(e.into()),
    };

    info!(usuario_id = id, alterado_por = gestor.id, "Usuário atualizado");
    Ok(HttpResponse::Ok().json(usuario.para_resposta()?))
}

#[delete("/auth/users/{id}")]
pub async fn deletar_usuario(
    data: web::Data<AppState>,
    gestor: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if id == gestor.id {
        return Err(AppError::regra_negocio("Você não pode excluir a própria conta."));
    }

    let alvo = buscar_usuario(&data.db_pool, id).await?;
    let papel_alvo = alvo.papel()?;
    verificar_alcance(&gestor, papel_alvo)?;
    if papel_alvo == Papel::Admin && contar_admins(&data.db_pool).await? <= 1 {
        return Err(AppError::regra_negocio("Não é possível excluir o último administrador."));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&data.db_pool)
        .await?;

    if let Some(foto) = alvo.foto {
        remover_foto(&data.config.upload_dir, foto).await;
    }

    info!(usuario_id = id, removido_por = gestor.id, "Usuário removido");
    Ok(HttpResponse::Ok().json(MensagemResponse::new("Usuário removido com sucesso.")))
}

/// Troca da própria senha.
#[put("/auth/password")]
pub async fn alterar_senha(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    pedido: web::Json<AlterarSenhaRequest>,
) -> Result<HttpResponse, AppError> {
    let pedido = pedido.into_inner();
    pedido.validate()?;

    let registro = buscar_usuario(&data.db_pool, usuario.id).await?;
    if !conferir_senha(pedido.senha_atual, registro.password_hash).await? {
        return Err(AppError::nao_autenticado("Senha atual incorreta."));
    }

    let novo_hash = gerar_hash(pedido.nova_senha).await?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&novo_hash)
        .bind(usuario.id)
        .execute(&data.db_pool)
        .await?;

    info!(usuario_id = usuario.id, "Senha alterada");
    Ok(HttpResponse::Ok().json(MensagemResponse::new("Senha alterada com sucesso.")))
}

/// Nome do arquivo de foto: `user_<id>_<timestamp>.<ext>`.
pub fn nome_arquivo_foto(usuario_id: i32, extensao: &str, timestamp: i64) -> String {
    format!("user_{}_{}.{}", usuario_id, timestamp, extensao)
}

/// Extensão normalizada de um arquivo de foto aceito.
pub fn extensao_foto(nome_arquivo: &str) -> Result<String, AppError> {
    let extensao = nome_arquivo
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    if FORMATOS_FOTO.contains(&extensao.as_str()) {
        Ok(extensao)
    } else {
        Err(AppError::validacao(format!(
            "Formato de imagem não suportado. Aceitos: {}",
            FORMATOS_FOTO.join(", ")
        )))
    }
}

async fn remover_foto(diretorio: &std::path::Path, foto: String) {
    let caminho = diretorio.join(foto);
    let resultado = web::block(move || std::fs::remove_file(caminho)).await;
    if let Ok(Err(e)) = resultado {
        warn!(erro = %e, "Falha ao remover foto antiga");
    }
}

/// Upload da foto do usuário (o próprio usuário ou um gestor).
#[post("/auth/users/{id}/foto")]
pub async fn enviar_foto(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let alvo = buscar_usuario(&data.db_pool, id).await?;
    if usuario.id != id {
        verificar_alcance(&usuario, alvo.papel()?)?;
    }

    let mut arquivo: Option<(String, Vec<u8>)> = None;
    while let Some(mut campo) = payload.try_next().await? {
        let Some(nome_original) = campo.content_disposition().get_filename().map(str::to_owned) else {
            continue;
        };
        let extensao = extensao_foto(&nome_original)?;

        let mut bytes = Vec::new();
        while let Some(pedaco) = campo.try_next().await? {
            if bytes.len() + pedaco.len() > TAMANHO_MAXIMO_FOTO {
                return Err(AppError::validacao("Imagem excede o limite de 5MB."));
            }
            bytes.extend_from_slice(&pedaco);
        }
        arquivo = Some((extensao, bytes));
        break;
    }

    let (extensao, bytes) = arquivo.ok_or_else(|| AppError::validacao("Nenhum arquivo enviado."))?;
    if bytes.is_empty() {
        return Err(AppError::validacao("Arquivo vazio."));
    }

    let nome = nome_arquivo_foto(id, &extensao, Utc::now().timestamp());
    let diretorio = data.config.upload_dir.clone();
    let caminho = diretorio.join(&nome);
    web::block(move || {
        std::fs::create_dir_all(&diretorio)?;
        std::fs::write(caminho, bytes)
    })
    .await??;

    sqlx::query("UPDATE users SET foto = $1, updated_at = NOW() WHERE id = $2")
        .bind(&nome)
        .bind(id)
        .execute(&data.db_pool)
        .await?;

    if let Some(antiga) = alvo.foto.filter(|antiga| antiga != &nome) {
        remover_foto(&data.config.upload_dir, antiga).await;
    }

    info!(usuario_id = id, arquivo = %nome, "Foto de usuário atualizada");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "foto": nome })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn autenticado(id: i32, papel: Papel) -> UsuarioAutenticado {
        UsuarioAutenticado {
            id,
            username: format!("u{}", id),
            papel,
            permissoes: Permissoes::default(),
        }
    }

    #[test]
    fn gerente_so_alcanca_funcionarios() {
        let gerente = autenticado(1, Papel::Manager);
        assert!(verificar_alcance(&gerente, Papel::Employee).is_ok());
        assert!(matches!(verificar_alcance(&gerente, Papel::Manager), Err(AppError::Proibido(_))));
        assert!(matches!(verificar_alcance(&gerente, Papel::Admin), Err(AppError::Proibido(_))));

        let admin = autenticado(2, Papel::Admin);
        assert!(verificar_alcance(&admin, Papel::Manager).is_ok());

        let funcionario = autenticado(3, Papel::Employee);
        assert!(verificar_alcance(&funcionario, Papel::Employee).is_err());
    }

    #[test]
    fn nome_da_foto_inclui_id_do_usuario() {
        assert_eq!(nome_arquivo_foto(12, "png", 1_700_000_000), "user_12_1700000000.png");
    }

    #[test]
    fn somente_formatos_de_imagem_conhecidos() {
        assert_eq!(extensao_foto("perfil.JPG").unwrap(), "jpg");
        assert!(extensao_foto("script.sh").is_err());
        assert!(extensao_foto("sem_extensao").is_err());
    }
}
