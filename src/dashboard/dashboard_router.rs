// src/dashboard/dashboard_router.rs

use actix_web::{get, web, HttpResponse};
use chrono::{Duration, NaiveDate};
use sqlx::PgPool;

use super::dashboard_structs::{
    inicio_do_mes, AlertaEstoque, ContagensRow, DashboardStats, FaturamentoCategoria, FaturamentoDia, FiltroRanking,
    FiltroStats, PosicaoRanking, RankingVendedores, ResumoVendas, ResumoVendasRow, VendedorRow,
};
use crate::clientes::clientes_structs::DIAS_VALIDADE_ADESAO;
use crate::estoque::contabilidade::SQL_SALDOS;
use crate::shared::datas::hoje;
use crate::shared::erro::AppError;
use crate::usuarios::auth_middleware::UsuarioAutenticado;
use crate::usuarios::permissoes::Permissao;
use crate::vendas::calculo_venda::ticket_medio;
use crate::AppState;

/// Quantidade e total das vendas entre duas datas (inclusive).
async fn resumir_vendas(pool: &PgPool, inicio: NaiveDate, fim: NaiveDate) -> Result<ResumoVendas, sqlx::Error> {
    let linha = sqlx::query_as::<_, ResumoVendasRow>(
        "SELECT COUNT(*) AS quantidade, COALESCE(SUM(total), 0) AS total \
         FROM sales WHERE created_at::DATE BETWEEN $1 AND $2",
    )
    .bind(inicio)
    .bind(fim)
    .fetch_one(pool)
    .await?;

    Ok(ResumoVendas {
        ticket_medio: ticket_medio(&linha.total, linha.quantidade),
        quantidade: linha.quantidade,
        total: linha.total,
    })
}

/// Indicadores do painel inicial.
#[get("/dashboard/stats")]
pub async fn estatisticas(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    filtro: web::Query<FiltroStats>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Dashboard)?;
    let pool = &data.db_pool;
    // "Hoje" no mesmo fuso em que `created_at::DATE` é avaliado
    let hoje = hoje(pool).await?;
    let inicio_mes = inicio_do_mes(hoje);

    let vendas_hoje = resumir_vendas(pool, hoje, hoje).await?;
    let vendas_mes = resumir_vendas(pool, inicio_mes, hoje).await?;

    let contagens = sqlx::query_as::<_, ContagensRow>(
        "SELECT (SELECT COUNT(*) FROM products) AS total_produtos, \
                (SELECT COUNT(*) FROM clientes) AS total_clientes, \
                (SELECT COUNT(*) FROM clientes WHERE data_adesao > $1::DATE - $2::INT) AS clientes_ativos",
    )
    .bind(hoje)
    .bind(DIAS_VALIDADE_ADESAO as i32)
    .fetch_one(pool)
    .await?;

    let primeiro_dia = hoje - Duration::days(filtro.dias() - 1);
    let faturamento_por_dia = sqlx::query_as::<_, FaturamentoDia>(
        "SELECT d.dia::DATE AS dia, COUNT(s.id) AS quantidade, COALESCE(SUM(s.total), 0) AS total \
         FROM generate_series($1::DATE, $2::DATE, INTERVAL '1 day') AS d(dia) \
         LEFT JOIN sales s ON s.created_at::DATE = d.dia::DATE \
         GROUP BY d.dia ORDER BY d.dia",
    )
    .bind(primeiro_dia)
    .bind(hoje)
    .fetch_all(pool)
    .await?;

    let faturamento_por_categoria = sqlx::query_as::<_, FaturamentoCategoria>(
        "SELECT COALESCE(NULLIF(p.categoria, ''), 'Sem categoria') AS categoria, \
                SUM(si.quantidade)::BIGINT AS quantidade_itens, SUM(si.subtotal) AS total \
         FROM sale_items si \
         JOIN sales s ON s.id = si.sale_id \
         JOIN products p ON p.id = si.produto_id \
         WHERE s.created_at::DATE BETWEEN $1 AND $2 \
         GROUP BY 1 ORDER BY total DESC",
    )
    .bind(inicio_mes)
    .bind(hoje)
    .fetch_all(pool)
    .await?;

    // Só produtos que já passaram por conferência
    let estoque_baixo = sqlx::query_as::<_, AlertaEstoque>(&format!(
        "WITH saldos AS ({}) \
         SELECT p.id AS produto_id, p.descricao, p.categoria, s.disponivel \
         FROM products p JOIN saldos s ON s.produto_id = p.id \
         WHERE s.movimentacoes > 0 AND s.disponivel <= $1 \
         ORDER BY s.disponivel, p.descricao",
        SQL_SALDOS
    ))
    .bind(filtro.limite_estoque())
    .fetch_all(pool)
    .await?;

    Ok(HttpResponse::Ok().json(DashboardStats {
        hoje: vendas_hoje,
        mes: vendas_mes,
        total_produtos: contagens.total_produtos,
        total_clientes: contagens.total_clientes,
        clientes_ativos: contagens.clientes_ativos,
        faturamento_por_dia,
        faturamento_por_categoria,
        estoque_baixo,
    }))
}

/// Ranking de vendedores por faturamento no período.
#[get("/dashboard/ranking")]
pub async fn ranking_vendedores(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    filtro: web::Query<FiltroRanking>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Relatorios)?;
    let (inicio, fim) = filtro.periodo(hoje(&data.db_pool).await?)?;

    let vendedores = sqlx::query_as::<_, VendedorRow>(
        "SELECT u.id AS usuario_id, u.username, COUNT(s.id) AS quantidade_vendas, SUM(s.total) AS faturamento \
         FROM sales s JOIN users u ON u.id = s.usuario_id \
         WHERE s.created_at::DATE BETWEEN $1 AND $2 \
         GROUP BY u.id, u.username \
         ORDER BY faturamento DESC, quantidade_vendas DESC \
         LIMIT $3",
    )
    .bind(inicio)
    .bind(fim)
    .bind(filtro.limite())
    .fetch_all(&data.db_pool)
    .await?;

    let vendedores = vendedores
        .into_iter()
        .enumerate()
        .map(|(i, v)| PosicaoRanking {
            posicao: i + 1,
            ticket_medio: ticket_medio(&v.faturamento, v.quantidade_vendas),
            usuario_id: v.usuario_id,
            username: v.username,
            quantidade_vendas: v.quantidade_vendas,
            faturamento: v.faturamento,
        })
        .collect();

    Ok(HttpResponse::Ok().json(RankingVendedores { inicio, fim, vendedores }))
}
