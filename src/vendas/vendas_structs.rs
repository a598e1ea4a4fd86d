// src/vendas/vendas_structs.rs

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormaPagamento {
    Dinheiro,
    CartaoCredito,
    CartaoDebito,
    Pix,
}

impl FormaPagamento {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormaPagamento::Dinheiro => "dinheiro",
            FormaPagamento::CartaoCredito => "cartao_credito",
            FormaPagamento::CartaoDebito => "cartao_debito",
            FormaPagamento::Pix => "pix",
        }
    }
}

/// Item pedido numa venda.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ItemVenda {
    pub produto_id: i32,
    #[validate(range(min = 1, message = "A quantidade deve ser maior que zero"))]
    pub quantidade: i32,
}

/// Corpo de `POST /sales`.
#[derive(Debug, Deserialize, Validate)]
pub struct NovaVenda {
    #[validate(length(min = 1, message = "A venda precisa de pelo menos um item"), nested)]
    pub itens: Vec<ItemVenda>,
    #[serde(default)]
    pub desconto: Option<BigDecimal>,
    pub forma_pagamento: FormaPagamento,
    #[serde(default)]
    pub cliente_id: Option<i32>,
}

/// Cabeçalho da venda com vendedor e cliente.
#[derive(Debug, Serialize, FromRow)]
pub struct Venda {
    pub id: i32,
    pub total: BigDecimal,
    pub desconto: BigDecimal,
    pub forma_pagamento: String,
    pub usuario_id: Option<i32>,
    pub vendedor: Option<String>,
    pub cliente_id: Option<i32>,
    pub cliente: Option<String>,
    pub quantidade_itens: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ItemVendido {
    pub id: i32,
    pub produto_id: i32,
    pub produto: String,
    pub quantidade: i32,
    pub valor_unitario: BigDecimal,
    pub subtotal: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct VendaDetalhada {
    #[serde(flatten)]
    pub venda: Venda,
    pub itens: Vec<ItemVendido>,
}

#[derive(Debug, Deserialize)]
pub struct FiltroVendas {
    /// Dia das vendas (`YYYY-MM-DD`).
    pub date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Intervalo fechado de datas (`?start_date=&end_date=`).
#[derive(Debug, Deserialize)]
pub struct PeriodoQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, FromRow)]
pub struct TotaisPeriodoRow {
    pub quantidade_vendas: i64,
    pub faturamento: BigDecimal,
    pub descontos: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct TotaisPeriodo {
    pub quantidade_vendas: i64,
    pub faturamento: BigDecimal,
    pub descontos: BigDecimal,
    pub ticket_medio: BigDecimal,
}

#[derive(Debug, Serialize, FromRow)]
pub struct VendasPorFormaPagamento {
    pub forma_pagamento: String,
    pub quantidade: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Serialize, FromRow)]
pub struct VendasPorDia {
    pub dia: NaiveDate,
    pub quantidade: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ProdutoMaisVendido {
    pub produto_id: i32,
    pub descricao: String,
    pub quantidade: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct RelatorioPeriodo {
    pub inicio: NaiveDate,
    pub fim: NaiveDate,
    pub totais: TotaisPeriodo,
    pub por_forma_pagamento: Vec<VendasPorFormaPagamento>,
    pub por_dia: Vec<VendasPorDia>,
    pub produtos_mais_vendidos: Vec<ProdutoMaisVendido>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forma_de_pagamento_usa_snake_case() {
        let forma: FormaPagamento = serde_json::from_str("\"cartao_credito\"").unwrap();
        assert_eq!(forma, FormaPagamento::CartaoCredito);
        assert_eq!(forma.as_str(), "cartao_credito");
        assert!(serde_json::from_str::<FormaPagamento>("\"boleto\"").is_err());
    }

    #[test]
    fn venda_sem_itens_ou_com_quantidade_zero_e_invalida() {
        let vazia: NovaVenda = serde_json::from_str(r#"{"itens": [], "forma_pagamento": "pix"}"#).unwrap();
        assert!(vazia.validate().is_err());

        let zerada: NovaVenda =
            serde_json::from_str(r#"{"itens": [{"produto_id": 1, "quantidade": 0}], "forma_pagamento": "pix"}"#)
                .unwrap();
        assert!(zerada.validate().is_err());

        let valida: NovaVenda = serde_json::from_str(
            r#"{"itens": [{"produto_id": 1, "quantidade": 2}], "forma_pagamento": "dinheiro", "desconto": "1.50"}"#,
        )
        .unwrap();
        assert!(valida.validate().is_ok());
        assert_eq!(valida.cliente_id, None);
    }
}
