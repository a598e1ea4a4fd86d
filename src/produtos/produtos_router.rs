// src/produtos/produtos_router.rs

use actix_web::{delete, get, post, put, web, HttpResponse};
use sqlx::PgPool;
use tracing::info;

use super::produtos_structs::{
    padrao_like, BuscaQuery, DadosProduto, FiltroProdutos, Produto, ProdutoComSaldo, COLUNAS_PRODUTO,
};
use crate::estoque::contabilidade::{bloquear_produto, carregar_saldo, SQL_SALDOS};
use crate::shared::erro::AppError;
use crate::shared::shared_structs::{MensagemResponse, PaginaResponse, Paginacao};
use crate::usuarios::auth_middleware::UsuarioAutenticado;
use crate::usuarios::permissoes::Permissao;
use crate::AppState;

/// Máximo de resultados da busca rápida.
const LIMITE_BUSCA: i64 = 50;

/// SELECT de produtos com saldo; espera um `WHERE`/`ORDER BY` concatenado depois.
fn select_com_saldo() -> String {
    format!(
        "WITH saldos AS ({}) \
         SELECT {}, s.conferido, s.perdas, s.vendido, s.disponivel, s.movimentacoes \
         FROM products p JOIN saldos s ON s.produto_id = p.id",
        SQL_SALDOS, COLUNAS_PRODUTO
    )
}

/// Garante que nenhum outro produto usa os mesmos códigos de barras.
async fn verificar_codigos_livres(pool: &PgPool, dados: &DadosProduto, ignorar_id: Option<i32>) -> Result<(), AppError> {
    let codigos = dados.codigos();
    if codigos.is_empty() {
        return Ok(());
    }

    let conflito: Option<(i32, String)> = sqlx::query_as(
        "SELECT id, descricao FROM products \
         WHERE (codigo_barras = ANY($1) OR codigo_barras_2 = ANY($1)) \
           AND ($2::INT IS NULL OR id <> $2) \
         LIMIT 1",
    )
    .bind(&codigos)
    .bind(ignorar_id)
    .fetch_optional(pool)
    .await?;

    match conflito {
        Some((id, descricao)) => Err(AppError::conflito(format!(
            "Código de barras já utilizado pelo produto {} ({}).",
            id, descricao
        ))),
        None => Ok(()),
    }
}

/// Lista paginada do catálogo com o saldo de cada produto.
#[get("/products")]
pub async fn listar_produtos(
    data: web::Data<AppState>,
    _usuario: UsuarioAutenticado,
    filtro: web::Query<FiltroProdutos>,
) -> Result<HttpResponse, AppError> {
    let paginacao = Paginacao { page: filtro.page, limit: filtro.limit };
    let (_, limite) = paginacao.normalizar();
    let categoria = filtro.categoria.as_deref().map(str::trim).filter(|c| !c.is_empty());

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products p WHERE ($1::TEXT IS NULL OR p.categoria = $1)")
        .bind(categoria)
        .fetch_one(&data.db_pool)
        .await?;

    let produtos = sqlx::query_as::<_, ProdutoComSaldo>(&format!(
        "{} WHERE ($1::TEXT IS NULL OR p.categoria = $1) ORDER BY p.descricao LIMIT $2 OFFSET $3",
        select_com_saldo()
    ))
    .bind(categoria)
    .bind(limite)
    .bind(paginacao.offset())
    .fetch_all(&data.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(PaginaResponse::new(produtos, &paginacao, total)))
}

/// Busca por parte da descrição ou pelo código de barras exato.
#[get("/products/search")]
pub async fn pesquisar_produtos(
    data: web::Data<AppState>,
    _usuario: UsuarioAutenticado,
    busca: web::Query<BuscaQuery>,
) -> Result<HttpResponse, AppError> {
    let termo = busca.q.as_deref().map(str::trim).unwrap_or_default();
    if termo.is_empty() {
        return Err(AppError::validacao("Informe o termo de busca (q)."));
    }

    let produtos = sqlx::query_as::<_, ProdutoComSaldo>(&format!(
        "{} WHERE p.descricao ILIKE $1 OR p.codigo_barras = $2 OR p.codigo_barras_2 = $2 \
         ORDER BY (p.codigo_barras = $2 OR p.codigo_barras_2 = $2) DESC NULLS LAST, p.descricao \
         LIMIT $3",
        select_com_saldo()
    ))
    .bind(padrao_like(termo))
    .bind(termo)
    .bind(LIMITE_BUSCA)
    .fetch_all(&data.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(produtos))
}

/// Produtos à venda: já conferidos ao menos uma vez e com saldo positivo.
#[get("/products/disponiveis")]
pub async fn produtos_disponiveis(
    data: web::Data<AppState>,
    _usuario: UsuarioAutenticado,
) -> Result<HttpResponse, AppError> {
    let produtos = sqlx::query_as::<_, ProdutoComSaldo>(&format!(
        "{} WHERE s.movimentacoes > 0 AND s.disponivel > 0 ORDER BY p.descricao",
        select_com_saldo()
    ))
    .fetch_all(&data.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(produtos))
}

#[get("/products/{id}")]
pub async fn buscar_produto_por_id(
    data: web::Data<AppState>,
    _usuario: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let produto = sqlx::query_as::<_, ProdutoComSaldo>(&format!("{} WHERE p.id = $1", select_com_saldo()))
        .bind(id)
        .fetch_optional(&data.db_pool)
        .await?
        .ok_or_else(|| AppError::nao_encontrado(format!("Produto {} não encontrado.", id)))?;

    Ok(HttpResponse::Ok().json(produto))
}

#[post("/products")]
pub async fn cadastrar_produto(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    item: web::Json<DadosProduto>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Produtos)?;
    let item = item.into_inner().normalizar()?;
    verificar_codigos_livres(&data.db_pool, &item, None).await?;

    let produto = sqlx::query_as::<_, Produto>(&format!(
        "INSERT INTO products AS p (descricao, quantidade, valor_custo, valor_venda, categoria, codigo_barras, codigo_barras_2) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
        COLUNAS_PRODUTO
    ))
    .bind(&item.descricao)
    .bind(item.quantidade)
    .bind(&item.valor_custo)
    .bind(&item.valor_venda)
    .bind(&item.categoria)
    .bind(&item.codigo_barras)
    .bind(&item.codigo_barras_2)
    .fetch_one(&data.db_pool)
    .await?;

    info!(produto_id = produto.id, usuario_id = usuario.id, "Produto cadastrado");
    Ok(HttpResponse::Created().json(produto))
}

/// Atualiza um produto. A quantidade recebida não pode ficar abaixo do total já conferido.
#[put("/products/{id}")]
pub async fn atualizar_produto(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
    item: web::Json<DadosProduto>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Produtos)?;
    let id = path.into_inner();
    let item = item.into_inner().normalizar()?;
    verificar_codigos_livres(&data.db_pool, &item, Some(id)).await?;

    let mut transaction = data.db_pool.begin().await?;

    bloquear_produto(&mut *transaction, id)
        .await?
        .ok_or_else(|| AppError::nao_encontrado(format!("Produto {} não encontrado.", id)))?;

    let saldo = carregar_saldo(&mut *transaction, id).await?;
    if i64::from(item.quantidade) < saldo.conferido {
        return Err(AppError::regra_negocio(format!(
            "Quantidade recebida ({}) não pode ser menor que a já conferida ({}).",
            item.quantidade, saldo.conferido
        )));
    }

    let produto = sqlx::query_as::<_, Produto>(&format!(
        "UPDATE products AS p SET descricao = $1, quantidade = $2, valor_custo = $3, valor_venda = $4, \
             categoria = $5, codigo_barras = $6, codigo_barras_2 = $7, updated_at = NOW() \
         WHERE p.id = $8 RETURNING {}",
        COLUNAS_PRODUTO
    ))
    .bind(&item.descricao)
    .bind(item.quantidade)
    .bind(&item.valor_custo)
    .bind(&item.valor_venda)
    .bind(&item.categoria)
    .bind(&item.codigo_barras)
    .bind(&item.codigo_barras_2)
    .bind(id)
    .fetch_one(&mut *transaction)
    .await?;

    transaction.commit().await?;

    info!(produto_id = id, usuario_id = usuario.id, "Produto atualizado");
    Ok(HttpResponse::Ok().json(produto))
}

/// Remove um produto sem vendas; movimentações e contador de vendidos vão junto.
///
/// O produto é bloqueado como numa venda, então a contagem de itens vendidos
/// não muda entre a verificação e a exclusão.
#[delete("/products/{id}")]
pub async fn deletar_produto(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Produtos)?;
    let id = path.into_inner();

    let mut transaction = data.db_pool.begin().await?;

    bloquear_produto(&mut *transaction, id)
        .await?
        .ok_or_else(|| AppError::nao_encontrado(format!("Produto {} não encontrado.", id)))?;

    let (vendas,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sale_items WHERE produto_id = $1")
        .bind(id)
        .fetch_one(&mut *transaction)
        .await?;
    if vendas > 0 {
        return Err(AppError::conflito(format!(
            "Produto possui {} item(ns) de venda associado(s) e não pode ser excluído.",
            vendas
        )));
    }

    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&mut *transaction)
        .await?;
    transaction.commit().await?;

    info!(produto_id = id, usuario_id = usuario.id, "Produto removido");
    Ok(HttpResponse::Ok().json(MensagemResponse::new("Produto removido com sucesso.")))
}
