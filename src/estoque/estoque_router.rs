// src/estoque/estoque_router.rs

use actix_web::{delete, get, post, web, HttpResponse};
use bigdecimal::BigDecimal;
use tracing::{info, warn};
use validator::Validate;

use super::contabilidade::{bloquear_produto, carregar_saldo, TipoMovimentacao, SQL_SALDOS};
use super::estoque_structs::{
    FiltroMovimentacoes, FiltroResumo, Movimentacao, MovimentacaoRegistrada, RegistrarMovimentacao,
    ResumoEstoque, ResumoProduto, TotaisEstoque,
};
use crate::shared::erro::AppError;
use crate::shared::shared_structs::{MensagemResponse, PaginaResponse, Paginacao};
use crate::usuarios::auth_middleware::UsuarioAutenticado;
use crate::usuarios::permissoes::Permissao;
use crate::AppState;

const SELECT_MOVIMENTACAO: &str = "\
    SELECT e.id, e.produto_id, p.descricao AS produto, e.tipo, e.quantidade, e.valor_unitario, \
           e.valor_total, e.usuario_id, u.username AS usuario, e.observacao, e.created_at \
    FROM estoque e \
    JOIN products p ON p.id = e.produto_id \
    LEFT JOIN users u ON u.id = e.usuario_id";

/// Registra uma conferência ou perda.
///
/// A linha do produto fica bloqueada durante a transação e o saldo é
/// recalculado antes de aceitar a movimentação.
#[post("/estoque/registrar")]
pub async fn registrar_movimentacao(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    pedido: web::Json<RegistrarMovimentacao>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Estoque)?;
    let pedido = pedido.into_inner();
    pedido.validate()?;

    let mut transaction = data.db_pool.begin().await?;

    let produto = bloquear_produto(&mut *transaction, pedido.produto_id)
        .await?
        .ok_or_else(|| AppError::nao_encontrado(format!("Produto {} não encontrado.", pedido.produto_id)))?;

    let saldo = carregar_saldo(&mut *transaction, produto.id).await?;
    if let Err(e) = saldo.validar_movimentacao(&produto, pedido.tipo, i64::from(pedido.quantidade)) {
        warn!(produto_id = produto.id, tipo = pedido.tipo.as_str(), quantidade = pedido.quantidade, erro = %e, "Movimentação recusada");
        return Err(e);
    }

    let valor_total = &produto.valor_venda * &BigDecimal::from(pedido.quantidade);
    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO estoque (produto_id, tipo, quantidade, valor_unitario, valor_total, usuario_id, observacao) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(produto.id)
    .bind(pedido.tipo.as_str())
    .bind(pedido.quantidade)
    .bind(&produto.valor_venda)
    .bind(&valor_total)
    .bind(usuario.id)
    .bind(pedido.observacao.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .fetch_one(&mut *transaction)
    .await?;

    let saldo = carregar_saldo(&mut *transaction, produto.id).await?;
    let movimentacao = sqlx::query_as::<_, Movimentacao>(&format!("{} WHERE e.id = $1", SELECT_MOVIMENTACAO))
        .bind(id)
        .fetch_one(&mut *transaction)
        .await?;

    transaction.commit().await?;

    info!(
        movimentacao_id = id,
        produto_id = produto.id,
        tipo = pedido.tipo.as_str(),
        quantidade = pedido.quantidade,
        disponivel = saldo.disponivel(),
        "Movimentação de estoque registrada"
    );
    Ok(HttpResponse::Created().json(MovimentacaoRegistrada { movimentacao, saldo: saldo.into() }))
}

/// Resumo agregado: recebido, conferido, perdas, vendido e disponível por produto.
#[get("/estoque/resumo")]
pub async fn resumo_estoque(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    filtro: web::Query<FiltroResumo>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Estoque)?;

    let produtos = sqlx::query_as::<_, ResumoProduto>(&format!(
        "WITH saldos AS ({}) \
         SELECT p.id AS produto_id, p.descricao, p.categoria, p.quantidade::BIGINT AS quantidade_recebida, \
                s.conferido, s.perdas, s.vendido, s.disponivel, p.valor_venda, s.movimentacoes \
         FROM products p JOIN saldos s ON s.produto_id = p.id \
         WHERE ($1::INT IS NULL OR p.id = $1) \
         ORDER BY p.descricao",
        SQL_SALDOS
    ))
    .bind(filtro.produto_id)
    .fetch_all(&data.db_pool)
    .await?;

    let totais = TotaisEstoque::somar(&produtos);
    Ok(HttpResponse::Ok().json(ResumoEstoque { produtos, totais }))
}

#[get("/estoque/movimentacoes")]
pub async fn listar_movimentacoes(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    filtro: web::Query<FiltroMovimentacoes>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Estoque)?;

    let paginacao = Paginacao { page: filtro.page, limit: filtro.limit };
    let (_, limite) = paginacao.normalizar();
    let tipo = filtro.tipo.map(|t| t.as_str());

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM estoque e \
         WHERE ($1::INT IS NULL OR e.produto_id = $1) AND ($2::TEXT IS NULL OR e.tipo = $2)",
    )
    .bind(filtro.produto_id)
    .bind(tipo)
    .fetch_one(&data.db_pool)
    .await?;

    let movimentacoes = sqlx::query_as::<_, Movimentacao>(&format!(
        "{} WHERE ($1::INT IS NULL OR e.produto_id = $1) AND ($2::TEXT IS NULL OR e.tipo = $2) \
         ORDER BY e.created_at DESC, e.id DESC LIMIT $3 OFFSET $4",
        SELECT_MOVIMENTACAO
    ))
    .bind(filtro.produto_id)
    .bind(tipo)
    .bind(limite)
    .bind(paginacao.offset())
    .fetch_all(&data.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(PaginaResponse::new(movimentacoes, &paginacao, total)))
}

/// Exclusão administrativa de uma movimentação.
#[delete("/estoque/{id}")]
pub async fn deletar_movimentacao(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir_admin()?;
    let id = path.into_inner();

    let mut transaction = data.db_pool.begin().await?;

    let movimento: Option<(i32, String, i32)> =
        sqlx::query_as("SELECT produto_id, tipo, quantidade FROM estoque WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *transaction)
            .await?;
    let (produto_id, tipo, quantidade) =
        movimento.ok_or_else(|| AppError::nao_encontrado(format!("Movimentação {} não encontrada.", id)))?;
    let tipo = TipoMovimentacao::from_db(&tipo)
        .ok_or_else(|| AppError::interno(format!("Tipo de movimentação inválido no banco: {}", tipo)))?;

    let produto = bloquear_produto(&mut *transaction, produto_id)
        .await?
        .ok_or_else(|| AppError::nao_encontrado(format!("Produto {} não encontrado.", produto_id)))?;
    let saldo = carregar_saldo(&mut *transaction, produto_id).await?;
    saldo.validar_remocao(&produto, tipo, i64::from(quantidade))?;

    sqlx::query("DELETE FROM estoque WHERE id = $1")
        .bind(id)
        .execute(&mut *transaction)
        .await?;
    transaction.commit().await?;

    info!(movimentacao_id = id, produto_id, removido_por = usuario.id, "Movimentação excluída");
    Ok(HttpResponse::Ok().json(MensagemResponse::new("Movimentação excluída com sucesso.")))
}
