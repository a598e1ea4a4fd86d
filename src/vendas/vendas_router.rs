// src/vendas/vendas_router.rs

use actix_web::{get, post, web, HttpResponse};
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};
use validator::Validate;

use super::calculo_venda::{agrupar_itens, calcular_total, ticket_medio, LinhaVenda};
use super::vendas_structs::{
    FiltroVendas, ItemVendido, NovaVenda, PeriodoQuery, ProdutoMaisVendido, RelatorioPeriodo, TotaisPeriodo,
    TotaisPeriodoRow, Venda, VendaDetalhada, VendasPorDia, VendasPorFormaPagamento,
};
use crate::clientes::clientes_structs::cliente_ativo;
use crate::estoque::contabilidade::{bloquear_produto, carregar_saldo};
use crate::shared::erro::AppError;
use crate::shared::shared_structs::{PaginaResponse, Paginacao};
use crate::usuarios::auth_middleware::UsuarioAutenticado;
use crate::usuarios::permissoes::Permissao;
use crate::AppState;

const SELECT_VENDA: &str = "\
    SELECT s.id, s.total, s.desconto, s.forma_pagamento, s.usuario_id, u.username AS vendedor, \
           s.cliente_id, c.nome AS cliente, \
           (SELECT COUNT(*) FROM sale_items si WHERE si.sale_id = s.id) AS quantidade_itens, \
           s.created_at \
    FROM sales s \
    LEFT JOIN users u ON u.id = s.usuario_id \
    LEFT JOIN clientes c ON c.id = s.cliente_id";

/// Quantos produtos entram no ranking do relatório por período.
const LIMITE_PRODUTOS_RELATORIO: i64 = 10;

/// Vendas que o usuário pode ver: todas com `relatorios`, senão só as próprias.
fn restricao_vendedor(usuario: &UsuarioAutenticado) -> Result<Option<i32>, AppError> {
    if usuario.pode(Permissao::Relatorios) {
        return Ok(None);
    }
    usuario.exigir(Permissao::Vendas)?;
    Ok(Some(usuario.id))
}

/// O cliente informado precisa existir e estar com a adesão em dia.
///
/// A linha fica bloqueada (`FOR SHARE`) até o fim da transação da venda, de
/// modo que o cliente não pode ser excluído nem ter a adesão alterada no meio.
async fn verificar_cliente(conn: &mut PgConnection, cliente_id: i32) -> Result<(), AppError> {
    let adesao: Option<(NaiveDate, NaiveDate)> =
        sqlx::query_as("SELECT data_adesao, CURRENT_DATE FROM clientes WHERE id = $1 FOR SHARE")
            .bind(cliente_id)
            .fetch_optional(&mut *conn)
            .await?;

    match adesao {
        None => Err(AppError::ClienteNaoEncontrado(cliente_id)),
        Some((data_adesao, hoje)) if !cliente_ativo(data_adesao, hoje) => Err(AppError::ClienteInativo { cliente_id }),
        Some(_) => Ok(()),
    }
}

async fn buscar_venda(pool: &PgPool, id: i32) -> Result<Option<VendaDetalhada>, sqlx::Error> {
    let Some(venda) = sqlx::query_as::<_, Venda>(&format!("{} WHERE s.id = $1", SELECT_VENDA))
        .bind(id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let itens = sqlx::query_as::<_, ItemVendido>(
        "SELECT si.id, si.produto_id, p.descricao AS produto, si.quantidade, si.valor_unitario, si.subtotal \
         FROM sale_items si JOIN products p ON p.id = si.produto_id \
         WHERE si.sale_id = $1 ORDER BY si.id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(VendaDetalhada { venda, itens }))
}

/// Registra uma venda.
///
/// Todos os produtos são bloqueados (em ordem de id) e têm o saldo conferido
/// antes de qualquer gravação; se um item não tiver estoque, nada é gravado.
#[post("/sales")]
pub async fn registrar_venda(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    pedido: web::Json<NovaVenda>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Vendas)?;
    let pedido = pedido.into_inner();
    pedido.validate()?;

    let itens = agrupar_itens(&pedido.itens)?;
    let desconto = pedido.desconto.clone().unwrap_or_else(BigDecimal::zero);

    let mut transaction = data.db_pool.begin().await?;
    if let Some(cliente_id) = pedido.cliente_id {
        verificar_cliente(&mut *transaction, cliente_id).await?;
    }

    let mut linhas = Vec::with_capacity(itens.len());
    for (produto_id, quantidade) in itens {
        let produto = bloquear_produto(&mut *transaction, produto_id)
            .await?
            .ok_or_else(|| AppError::nao_encontrado(format!("Produto {} não encontrado.", produto_id)))?;

        let saldo = carregar_saldo(&mut *transaction, produto_id).await?;
        if let Err(e) = saldo.exigir_disponivel(&produto, i64::from(quantidade)) {
            warn!(produto_id, solicitado = quantidade, disponivel = saldo.disponivel(), "Venda recusada por falta de estoque");
            return Err(e);
        }

        linhas.push(LinhaVenda::new(produto.id, quantidade, produto.valor_venda));
    }

    let total = calcular_total(&linhas, &desconto)?;

    let (venda_id,): (i32,) = sqlx::query_as(
        "INSERT INTO sales (total, desconto, forma_pagamento, usuario_id, cliente_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(&total)
    .bind(&desconto)
    .bind(pedido.forma_pagamento.as_str())
    .bind(usuario.id)
    .bind(pedido.cliente_id)
    .fetch_one(&mut *transaction)
    .await?;

    let mut insercao: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO sale_items (sale_id, produto_id, quantidade, valor_unitario, subtotal) ");
    insercao.push_values(&linhas, |mut linha, item| {
        linha
            .push_bind(venda_id)
            .push_bind(item.produto_id)
            .push_bind(item.quantidade)
            .push_bind(&item.valor_unitario)
            .push_bind(&item.subtotal);
    });
    insercao.build().execute(&mut *transaction).await?;

    let (produtos, quantidades): (Vec<i32>, Vec<i64>) =
        linhas.iter().map(|l| (l.produto_id, i64::from(l.quantidade))).unzip();
    sqlx::query(
        "INSERT INTO produto_vendas (produto_id, quantidade_vendida) \
         SELECT * FROM UNNEST($1::INT[], $2::BIGINT[]) \
         ON CONFLICT (produto_id) DO UPDATE \
         SET quantidade_vendida = produto_vendas.quantidade_vendida + EXCLUDED.quantidade_vendida",
    )
    .bind(&produtos)
    .bind(&quantidades)
    .execute(&mut *transaction)
    .await?;

    transaction.commit().await?;

    info!(
        venda_id,
        usuario_id = usuario.id,
        vendedor = %usuario.username,
        cliente_id = pedido.cliente_id,
        itens = linhas.len(),
        total = %total,
        forma_pagamento = pedido.forma_pagamento.as_str(),
        "Venda registrada"
    );

    let venda = buscar_venda(&data.db_pool, venda_id)
        .await?
        .ok_or_else(|| AppError::interno(format!("Venda {} não encontrada após o registro.", venda_id)))?;
    Ok(HttpResponse::Created().json(venda))
}

/// Lista paginada das vendas, opcionalmente de um único dia.
#[get("/sales")]
pub async fn listar_vendas(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    filtro: web::Query<FiltroVendas>,
) -> Result<HttpResponse, AppError> {
    let vendedor = restricao_vendedor(&usuario)?;
    let paginacao = Paginacao { page: filtro.page, limit: filtro.limit };
    let (_, limite) = paginacao.normalizar();

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sales s \
         WHERE ($1::DATE IS NULL OR s.created_at::DATE = $1) AND ($2::INT IS NULL OR s.usuario_id = $2)",
    )
    .bind(filtro.date)
    .bind(vendedor)
    .fetch_one(&data.db_pool)
    .await?;

    let vendas = sqlx::query_as::<_, Venda>(&format!(
        "{} WHERE ($1::DATE IS NULL OR s.created_at::DATE = $1) AND ($2::INT IS NULL OR s.usuario_id = $2) \
         ORDER BY s.created_at DESC, s.id DESC LIMIT $3 OFFSET $4",
        SELECT_VENDA
    ))
    .bind(filtro.date)
    .bind(vendedor)
    .bind(limite)
    .bind(paginacao.offset())
    .fetch_all(&data.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(PaginaResponse::new(vendas, &paginacao, total)))
}

/// Relatório consolidado de um período: totais, formas de pagamento, dias e produtos.
#[get("/sales/report/period")]
pub async fn relatorio_periodo(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    periodo: web::Query<PeriodoQuery>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Relatorios)?;
    let PeriodoQuery { start_date: inicio, end_date: fim } = periodo.into_inner();
    if inicio > fim {
        return Err(AppError::validacao("A data inicial deve ser anterior ou igual à final."));
    }

    let totais = sqlx::query_as::<_, TotaisPeriodoRow>(
        "SELECT COUNT(*) AS quantidade_vendas, \
                COALESCE(SUM(total), 0) AS faturamento, \
                COALESCE(SUM(desconto), 0) AS descontos \
         FROM sales WHERE created_at::DATE BETWEEN $1 AND $2",
    )
    .bind(inicio)
    .bind(fim)
    .fetch_one(&data.db_pool)
    .await?;

    let por_forma_pagamento = sqlx::query_as::<_, VendasPorFormaPagamento>(
        "SELECT forma_pagamento, COUNT(*) AS quantidade, SUM(total) AS total \
         FROM sales WHERE created_at::DATE BETWEEN $1 AND $2 \
         GROUP BY forma_pagamento ORDER BY total DESC",
    )
    .bind(inicio)
    .bind(fim)
    .fetch_all(&data.db_pool)
    .await?;

    let por_dia = sqlx::query_as::<_, VendasPorDia>(
        "SELECT created_at::DATE AS dia, COUNT(*) AS quantidade, SUM(total) AS total \
         FROM sales WHERE created_at::DATE BETWEEN $1 AND $2 \
         GROUP BY 1 ORDER BY 1",
    )
    .bind(inicio)
    .bind(fim)
    .fetch_all(&data.db_pool)
    .await?;

    let produtos_mais_vendidos = sqlx::query_as::<_, ProdutoMaisVendido>(
        "SELECT si.produto_id, p.descricao, SUM(si.quantidade)::BIGINT AS quantidade, SUM(si.subtotal) AS total \
         FROM sale_items si \
         JOIN sales s ON s.id = si.sale_id \
         JOIN products p ON p.id = si.produto_id \
         WHERE s.created_at::DATE BETWEEN $1 AND $2 \
         GROUP BY si.produto_id, p.descricao \
         ORDER BY quantidade DESC, total DESC \
         LIMIT $3",
    )
    .bind(inicio)
    .bind(fim)
    .bind(LIMITE_PRODUTOS_RELATORIO)
    .fetch_all(&data.db_pool)
    .await?;

    let ticket_medio = ticket_medio(&totais.faturamento, totais.quantidade_vendas);
    Ok(HttpResponse::Ok().json(RelatorioPeriodo {
        inicio,
        fim,
        totais: TotaisPeriodo {
            quantidade_vendas: totais.quantidade_vendas,
            faturamento: totais.faturamento,
            descontos: totais.descontos,
            ticket_medio,
        },
        por_forma_pagamento,
        por_dia,
        produtos_mais_vendidos,
    }))
}

/// Detalhe da venda com os itens.
#[get("/sales/{id}")]
pub async fn buscar_venda_por_id(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let vendedor = restricao_vendedor(&usuario)?;
    let id = path.into_inner();

    let venda = buscar_venda(&data.db_pool, id)
        .await?
        .ok_or_else(|| AppError::nao_encontrado(format!("Venda {} não encontrada.", id)))?;

    if vendedor.is_some() && venda.venda.usuario_id != vendedor {
        return Err(AppError::proibido("Você só pode consultar as próprias vendas."));
    }

    Ok(HttpResponse::Ok().json(venda))
}
