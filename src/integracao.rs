// src/integracao.rs

//! Fluxos completos contra um PostgreSQL real.
//!
//! Rodam só com `DATABASE_URL` definido (ou no `.env`); sem ele cada teste
//! retorna logo no início. Cada teste cria os próprios usuário, produtos e
//! clientes com nomes únicos, então podem rodar em paralelo no mesmo banco.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::clientes::cpf::digito_verificador;
use crate::config::Config;
use crate::shared::datas::hoje;
use crate::usuarios::jwt::gerar_token;
use crate::{configurar_extratores, configurar_rotas, AppState};

const SEGREDO: &str = "segredo-de-integracao-com-mais-de-32-caracteres";

static SEQUENCIA: AtomicU64 = AtomicU64::new(0);

fn unico() -> u64 {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default();
    micros * 100 + SEQUENCIA.fetch_add(1, Ordering::Relaxed) % 100
}

/// CPF válido derivado de um número qualquer.
fn cpf_valido(semente: u64) -> String {
    let mut digitos: Vec<u32> = format!("{:09}", semente % 1_000_000_000)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();
    if digitos.iter().all(|d| *d == digitos[0]) {
        digitos[0] = (digitos[0] + 1) % 10;
    }
    let primeiro = digito_verificador(&digitos);
    digitos.push(primeiro);
    let segundo = digito_verificador(&digitos);
    digitos.push(segundo);
    digitos.iter().filter_map(|d| char::from_digit(*d, 10)).collect()
}

struct Banco {
    estado: web::Data<AppState>,
    token: String,
}

impl Banco {
    fn pool(&self) -> &PgPool {
        &self.estado.db_pool
    }

    fn autenticado(&self, requisicao: test::TestRequest) -> test::TestRequest {
        requisicao.insert_header((header::AUTHORIZATION, format!("Bearer {}", self.token)))
    }

    async fn produto(&self, preco: &str) -> i32 {
        let (id,): (i32,) = sqlx::query_as(
            "INSERT INTO products (descricao, valor_custo, valor_venda) VALUES ($1, 1, $2::NUMERIC) RETURNING id",
        )
        .bind(format!("Produto de teste {}", unico()))
        .bind(preco)
        .fetch_one(self.pool())
        .await
        .unwrap();
        id
    }

    async fn vendido(&self, produto_id: i32) -> i64 {
        let (vendido,): (i64,) = sqlx::query_as(
            "SELECT COALESCE((SELECT quantidade_vendida FROM produto_vendas WHERE produto_id = $1), 0)",
        )
        .bind(produto_id)
        .fetch_one(self.pool())
        .await
        .unwrap();
        vendido
    }

    async fn itens_vendidos(&self, produto_id: i32) -> i64 {
        let (itens,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sale_items WHERE produto_id = $1")
            .bind(produto_id)
            .fetch_one(self.pool())
            .await
            .unwrap();
        itens
    }
}

/// Conecta, aplica as migrações e cria um administrador exclusivo do teste.
async fn conectar() -> Option<Banco> {
    let _ = dotenv::dotenv();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL não definido; teste com banco ignorado");
        return None;
    };

    let db_pool = PgPoolOptions::new().max_connections(5).connect(&url).await.unwrap();
    sqlx::migrate!("./migrations").run(&db_pool).await.unwrap();

    let username = format!("teste_{}", unico());
    let (usuario_id,): (i32,) =
        sqlx::query_as("INSERT INTO users (username, password_hash, role) VALUES ($1, 'sem-login', 'admin') RETURNING id")
            .bind(&username)
            .fetch_one(&db_pool)
            .await
            .unwrap();
    let token = gerar_token(SEGREDO, usuario_id, &username, "admin", 1).unwrap();

    let config = Config::para_testes(&url, SEGREDO);
    Some(Banco { estado: web::Data::new(AppState { db_pool, config }), token })
}

macro_rules! app {
    ($banco:expr) => {
        test::init_service(
            App::new()
                .app_data($banco.estado.clone())
                .configure(configurar_extratores)
                .configure(configurar_rotas),
        )
        .await
    };
}

/// Envia a requisição e devolve o status e o corpo JSON.
macro_rules! chamar {
    ($app:expr, $requisicao:expr) => {{
        let resposta = test::call_service(&$app, $requisicao.to_request()).await;
        let status = resposta.status();
        let corpo: Value = test::read_body_json(resposta).await;
        (status, corpo)
    }};
}

#[actix_web::test]
async fn venda_acima_do_disponivel_nao_grava_nada() {
    let Some(banco) = conectar().await else { return };
    let app = app!(banco);
    let produto = banco.produto("2.50").await;

    let conferencia = banco
        .autenticado(test::TestRequest::post().uri("/estoque/registrar"))
        .set_json(json!({ "produto_id": produto, "tipo": "conferido", "quantidade": 10 }));
    let (status, _) = chamar!(app, conferencia);
    assert_eq!(status, StatusCode::CREATED);

    let primeira = banco
        .autenticado(test::TestRequest::post().uri("/sales"))
        .set_json(json!({ "itens": [{ "produto_id": produto, "quantidade": 7 }], "forma_pagamento": "pix" }));
    let (status, venda) = chamar!(app, primeira);
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(venda["total"], "17.50");
    assert_eq!(banco.vendido(produto).await, 7);

    let segunda = banco
        .autenticado(test::TestRequest::post().uri("/sales"))
        .set_json(json!({ "itens": [{ "produto_id": produto, "quantidade": 5 }], "forma_pagamento": "dinheiro" }));
    let (status, erro) = chamar!(app, segunda);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(erro["details"]["disponivel"], 3);
    assert_eq!(erro["details"]["solicitado"], 5);

    assert_eq!(banco.vendido(produto).await, 7);
    assert_eq!(banco.itens_vendidos(produto).await, 1);
}

#[actix_web::test]
async fn venda_com_um_item_sem_estoque_desfaz_os_demais() {
    let Some(banco) = conectar().await else { return };
    let app = app!(banco);
    let com_estoque = banco.produto("1.00").await;
    let sem_estoque = banco.produto("1.00").await;

    let conferencia = banco
        .autenticado(test::TestRequest::post().uri("/estoque/registrar"))
        .set_json(json!({ "produto_id": com_estoque, "tipo": "conferido", "quantidade": 4 }));
    assert_eq!(chamar!(app, conferencia).0, StatusCode::CREATED);

    let venda = banco.autenticado(test::TestRequest::post().uri("/sales")).set_json(json!({
        "itens": [
            { "produto_id": com_estoque, "quantidade": 2 },
            { "produto_id": com_estoque, "quantidade": 1 },
            { "produto_id": sem_estoque, "quantidade": 1 }
        ],
        "forma_pagamento": "cartao_debito"
    }));
    let (status, erro) = chamar!(app, venda);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(erro["details"]["produto_id"], sem_estoque);

    assert_eq!(banco.vendido(com_estoque).await, 0);
    assert_eq!(banco.itens_vendidos(com_estoque).await, 0);

    // Itens repetidos são somados numa única linha
    let valida = banco.autenticado(test::TestRequest::post().uri("/sales")).set_json(json!({
        "itens": [
            { "produto_id": com_estoque, "quantidade": 2 },
            { "produto_id": com_estoque, "quantidade": 1 }
        ],
        "forma_pagamento": "cartao_debito"
    }));
    let (status, venda) = chamar!(app, valida);
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(venda["itens"].as_array().map(Vec::len), Some(1));
    assert_eq!(banco.vendido(com_estoque).await, 3);
}

#[actix_web::test]
async fn cliente_com_vendas_nao_pode_ser_excluido() {
    let Some(banco) = conectar().await else { return };
    let app = app!(banco);
    let produto = banco.produto("5.00").await;

    let conferencia = banco
        .autenticado(test::TestRequest::post().uri("/estoque/registrar"))
        .set_json(json!({ "produto_id": produto, "tipo": "conferido", "quantidade": 3 }));
    assert_eq!(chamar!(app, conferencia).0, StatusCode::CREATED);

    let cadastro = banco
        .autenticado(test::TestRequest::post().uri("/clientes"))
        .set_json(json!({ "nome": "Cliente de teste", "cpf": cpf_valido(unico()) }));
    let (status, cliente) = chamar!(app, cadastro);
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(cliente["ativo"], true);
    let cliente_id = cliente["id"].as_i64().unwrap();

    let venda = banco.autenticado(test::TestRequest::post().uri("/sales")).set_json(json!({
        "itens": [{ "produto_id": produto, "quantidade": 1 }],
        "forma_pagamento": "dinheiro",
        "cliente_id": cliente_id
    }));
    assert_eq!(chamar!(app, venda).0, StatusCode::CREATED);

    let exclusao = banco.autenticado(test::TestRequest::delete().uri(&format!("/clientes/{}", cliente_id)));
    let (status, erro) = chamar!(app, exclusao);
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(erro["error"].as_str().unwrap().contains("1 venda"));

    let exclusao_produto = banco.autenticado(test::TestRequest::delete().uri(&format!("/products/{}", produto)));
    assert_eq!(chamar!(app, exclusao_produto).0, StatusCode::CONFLICT);

    let sem_vendas = banco
        .autenticado(test::TestRequest::post().uri("/clientes"))
        .set_json(json!({ "nome": "Cliente sem compras", "cpf": cpf_valido(unico()) }));
    let (_, cliente) = chamar!(app, sem_vendas);
    let uri = format!("/clientes/{}", cliente["id"]);
    assert_eq!(chamar!(app, banco.autenticado(test::TestRequest::delete().uri(&uri))).0, StatusCode::OK);
    assert_eq!(chamar!(app, banco.autenticado(test::TestRequest::delete().uri(&uri))).0, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn cliente_com_adesao_vencida_nao_compra() {
    let Some(banco) = conectar().await else { return };
    let app = app!(banco);
    let produto = banco.produto("1.00").await;

    let conferencia = banco
        .autenticado(test::TestRequest::post().uri("/estoque/registrar"))
        .set_json(json!({ "produto_id": produto, "tipo": "conferido", "quantidade": 1 }));
    assert_eq!(chamar!(app, conferencia).0, StatusCode::CREATED);

    let (cliente_id,): (i32,) = sqlx::query_as(
        "INSERT INTO clientes (nome, cpf, data_adesao) VALUES ('Adesão vencida', $1, CURRENT_DATE - 400) RETURNING id",
    )
    .bind(cpf_valido(unico()))
    .fetch_one(banco.pool())
    .await
    .unwrap();

    let venda = banco.autenticado(test::TestRequest::post().uri("/sales")).set_json(json!({
        "itens": [{ "produto_id": produto, "quantidade": 1 }],
        "forma_pagamento": "pix",
        "cliente_id": cliente_id
    }));
    let (status, erro) = chamar!(app, venda);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(erro["details"]["cliente_id"], cliente_id);
    assert_eq!(banco.vendido(produto).await, 0);
}

#[actix_web::test]
async fn venda_registrada_aparece_no_dia_de_hoje_do_painel() {
    let Some(banco) = conectar().await else { return };
    let app = app!(banco);
    let produto = banco.produto("3.00").await;

    let conferencia = banco
        .autenticado(test::TestRequest::post().uri("/estoque/registrar"))
        .set_json(json!({ "produto_id": produto, "tipo": "conferido", "quantidade": 2 }));
    assert_eq!(chamar!(app, conferencia).0, StatusCode::CREATED);

    let venda = banco
        .autenticado(test::TestRequest::post().uri("/sales"))
        .set_json(json!({ "itens": [{ "produto_id": produto, "quantidade": 2 }], "forma_pagamento": "pix" }));
    let (status, venda) = chamar!(app, venda);
    assert_eq!(status, StatusCode::CREATED);

    let (dia_da_venda,): (chrono::NaiveDate,) = sqlx::query_as("SELECT created_at::DATE FROM sales WHERE id = $1")
        .bind(venda["id"].as_i64().unwrap() as i32)
        .fetch_one(banco.pool())
        .await
        .unwrap();

    assert_eq!(hoje(banco.pool()).await.unwrap(), dia_da_venda);

    let (status, painel) = chamar!(app, banco.autenticado(test::TestRequest::get().uri("/dashboard/stats")));
    assert_eq!(status, StatusCode::OK);
    assert!(painel["hoje"]["quantidade"].as_i64().unwrap() >= 1);
}
