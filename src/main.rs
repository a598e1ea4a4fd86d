// src/main.rs

use actix_web::{get, middleware, web, App, HttpResponse, HttpServer};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};

mod clientes;
mod config;
mod dashboard;
mod estoque;
#[cfg(test)]
mod integracao;
mod produtos;
mod shared;
mod usuarios;
mod vendas;

use config::Config;
use shared::erro::{definir_modo_desenvolvimento, erro_json, erro_path, erro_query};
use shared::logger::init_logger;

/// Estado compartilhado entre as rotas: pool do banco e configuração.
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Config,
}

/// Verificação de saúde, sem autenticação e sem acesso ao banco.
#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "versao": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

/// Registra todas as rotas da API.
///
/// As rotas fixas de `/products` vêm antes de `/products/{id}`.
pub fn configurar_rotas(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        // Autenticação e usuários
        .service(usuarios::usuario_router::login)
        .service(usuarios::usuario_router::verificar)
        .service(usuarios::usuario_router::cadastrar_usuario)
        .service(usuarios::usuario_router::listar_usuarios)
        .service(usuarios::usuario_router::atualizar_usuario)
        .service(usuarios::usuario_router::deletar_usuario)
        .service(usuarios::usuario_router::alterar_senha)
        .service(usuarios::usuario_router::enviar_foto)
        // Produtos
        .service(produtos::produtos_router::listar_produtos)
        .service(produtos::produtos_router::pesquisar_produtos)
        .service(produtos::produtos_router::produtos_disponiveis)
        .service(produtos::importacao_router::baixar_modelo)
        .service(produtos::importacao_router::importar_produtos)
        .service(produtos::produtos_router::buscar_produto_por_id)
        .service(produtos::produtos_router::cadastrar_produto)
        .service(produtos::produtos_router::atualizar_produto)
        .service(produtos::produtos_router::deletar_produto)
        // Estoque
        .service(estoque::estoque_router::registrar_movimentacao)
        .service(estoque::estoque_router::resumo_estoque)
        .service(estoque::estoque_router::listar_movimentacoes)
        .service(estoque::estoque_router::deletar_movimentacao)
        // Vendas
        .service(vendas::vendas_router::registrar_venda)
        .service(vendas::vendas_router::listar_vendas)
        .service(vendas::vendas_router::relatorio_periodo)
        .service(vendas::vendas_router::buscar_venda_por_id)
        // Clientes
        .service(clientes::clientes_router::listar_clientes)
        .service(clientes::clientes_router::buscar_cliente_por_id)
        .service(clientes::clientes_router::cadastrar_cliente)
        .service(clientes::clientes_router::atualizar_cliente)
        .service(clientes::clientes_router::deletar_cliente)
        .service(clientes::clientes_router::renovar_adesao)
        // Dashboard
        .service(dashboard::dashboard_router::estatisticas)
        .service(dashboard::dashboard_router::ranking_vendedores);
}

/// Tratamento uniforme (400 `{error}`) para corpo, query e rota mal formados.
pub fn configurar_extratores(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(erro_json))
        .app_data(web::QueryConfig::default().error_handler(erro_query))
        .app_data(web::PathConfig::default().error_handler(erro_path));
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logger("info", false);
            error!(erro = %e, "Configuração inválida");
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logger("info,sqlx=warn", !config.desenvolvimento());
    definir_modo_desenvolvimento(config.desenvolvimento());
    if config.jwt_secret_provisorio {
        warn!("JWT_SECRET não definido, usando chave de desenvolvimento");
    }

    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!(erro = %e, "Falha ao conectar ao PostgreSQL");
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e.to_string())
        })?;

    sqlx::migrate!("./migrations").run(&db_pool).await.map_err(|e| {
        error!(erro = %e, "Falha ao aplicar migrações");
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let reparados = usuarios::permissoes::reparar_permissoes_armazenadas(&db_pool)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    if let Err(e) = usuarios::usuario_router::garantir_admin_inicial(&db_pool, &config).await {
        error!(erro = %e, "Falha ao criar o administrador inicial");
    }

    if let Err(e) = std::fs::create_dir_all(&config.upload_dir) {
        error!(erro = %e, diretorio = %config.upload_dir.display(), "Falha ao criar diretório de uploads");
    }

    let endereco = (config.host.clone(), config.port);
    info!(
        host = %endereco.0,
        porta = endereco.1,
        ambiente = ?config.ambiente,
        permissoes_reparadas = reparados,
        "Iniciando API PDV"
    );

    let app_state = web::Data::new(AppState { db_pool, config });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .configure(configurar_extratores)
            .configure(configurar_rotas)
    })
    .bind(endereco)?
    .run()
    .await
}
