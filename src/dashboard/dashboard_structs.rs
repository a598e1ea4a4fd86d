// src/dashboard/dashboard_structs.rs

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::shared::erro::AppError;

pub const DIAS_PADRAO: i64 = 7;
pub const DIAS_MAXIMO: i64 = 90;
pub const LIMITE_ESTOQUE_PADRAO: i64 = 5;
pub const LIMITE_RANKING_PADRAO: i64 = 10;
pub const LIMITE_RANKING_MAXIMO: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct FiltroStats {
    pub dias: Option<i64>,
    pub limite_estoque: Option<i64>,
}

impl FiltroStats {
    pub fn dias(&self) -> i64 {
        self.dias.unwrap_or(DIAS_PADRAO).clamp(1, DIAS_MAXIMO)
    }

    pub fn limite_estoque(&self) -> i64 {
        self.limite_estoque.unwrap_or(LIMITE_ESTOQUE_PADRAO).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct FiltroRanking {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl FiltroRanking {
    /// Período do ranking; sem datas, do primeiro dia do mês até hoje.
    pub fn periodo(&self, hoje: NaiveDate) -> Result<(NaiveDate, NaiveDate), AppError> {
        let inicio = self.start_date.unwrap_or_else(|| inicio_do_mes(hoje));
        let fim = self.end_date.unwrap_or(hoje);
        if inicio > fim {
            return Err(AppError::validacao("A data inicial deve ser anterior ou igual à final."));
        }
        Ok((inicio, fim))
    }

    pub fn limite(&self) -> i64 {
        self.limit.unwrap_or(LIMITE_RANKING_PADRAO).clamp(1, LIMITE_RANKING_MAXIMO)
    }
}

pub fn inicio_do_mes(data: NaiveDate) -> NaiveDate {
    data.with_day(1).unwrap_or(data)
}

#[derive(Debug, FromRow)]
pub struct ResumoVendasRow {
    pub quantidade: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct ResumoVendas {
    pub quantidade: i64,
    pub total: BigDecimal,
    pub ticket_medio: BigDecimal,
}

#[derive(Debug, FromRow)]
pub struct ContagensRow {
    pub total_produtos: i64,
    pub total_clientes: i64,
    pub clientes_ativos: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FaturamentoDia {
    pub dia: NaiveDate,
    pub quantidade: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FaturamentoCategoria {
    pub categoria: String,
    pub quantidade_itens: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Serialize, FromRow)]
pub struct AlertaEstoque {
    pub produto_id: i32,
    pub descricao: String,
    pub categoria: Option<String>,
    pub disponivel: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub hoje: ResumoVendas,
    pub mes: ResumoVendas,
    pub total_produtos: i64,
    pub total_clientes: i64,
    pub clientes_ativos: i64,
    pub faturamento_por_dia: Vec<FaturamentoDia>,
    pub faturamento_por_categoria: Vec<FaturamentoCategoria>,
    pub estoque_baixo: Vec<AlertaEstoque>,
}

#[derive(Debug, FromRow)]
pub struct VendedorRow {
    pub usuario_id: i32,
    pub username: String,
    pub quantidade_vendas: i64,
    pub faturamento: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct PosicaoRanking {
    pub posicao: usize,
    pub usuario_id: i32,
    pub username: String,
    pub quantidade_vendas: i64,
    pub faturamento: BigDecimal,
    pub ticket_medio: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct RankingVendedores {
    pub inicio: NaiveDate,
    pub fim: NaiveDate,
    pub vendedores: Vec<PosicaoRanking>,
}
