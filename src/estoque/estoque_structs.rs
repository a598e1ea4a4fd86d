// src/estoque/estoque_structs.rs

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::contabilidade::{Saldo, TipoMovimentacao};

/// Pedido de registro de movimentação (`POST /estoque/registrar`).
#[derive(Debug, Deserialize, Validate)]
pub struct RegistrarMovimentacao {
    pub produto_id: i32,
    pub tipo: TipoMovimentacao,
    #[validate(range(min = 1, message = "A quantidade deve ser maior que zero"))]
    pub quantidade: i32,
    #[validate(length(max = 255, message = "Observação com no máximo 255 caracteres"))]
    pub observacao: Option<String>,
}

/// Movimentação gravada, com a descrição do produto e quem registrou.
#[derive(Debug, Serialize, FromRow)]
pub struct Movimentacao {
    pub id: i32,
    pub produto_id: i32,
    pub produto: String,
    pub tipo: String,
    pub quantidade: i32,
    pub valor_unitario: BigDecimal,
    pub valor_total: BigDecimal,
    pub usuario_id: Option<i32>,
    pub usuario: Option<String>,
    pub observacao: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MovimentacaoRegistrada {
    pub movimentacao: Movimentacao,
    pub saldo: SaldoResponse,
}

/// Saldo exposto pela API, com o disponível já calculado.
#[derive(Debug, Serialize)]
pub struct SaldoResponse {
    pub conferido: i64,
    pub perdas: i64,
    pub vendido: i64,
    pub disponivel: i64,
}

impl From<Saldo> for SaldoResponse {
    fn from(saldo: Saldo) -> Self {
        SaldoResponse {
            conferido: saldo.conferido,
            perdas: saldo.perdas,
            vendido: saldo.vendido,
            disponivel: saldo.disponivel(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FiltroResumo {
    pub produto_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct FiltroMovimentacoes {
    pub produto_id: Option<i32>,
    pub tipo: Option<TipoMovimentacao>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Linha do resumo de estoque.
#[derive(Debug, Serialize, FromRow)]
pub struct ResumoProduto {
    pub produto_id: i32,
    pub descricao: String,
    pub categoria: Option<String>,
    pub quantidade_recebida: i64,
    pub conferido: i64,
    pub perdas: i64,
    pub vendido: i64,
    pub disponivel: i64,
    pub valor_venda: BigDecimal,
    pub movimentacoes: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct TotaisEstoque {
    pub produtos: usize,
    pub quantidade_recebida: i64,
    pub conferido: i64,
    pub perdas: i64,
    pub vendido: i64,
    pub disponivel: i64,
    pub valor_disponivel: BigDecimal,
}

impl TotaisEstoque {
    pub fn somar(linhas: &[ResumoProduto]) -> Self {
        linhas.iter().fold(TotaisEstoque::default(), |mut totais, linha| {
            totais.produtos += 1;
            totais.quantidade_recebida += linha.quantidade_recebida;
            totais.conferido += linha.conferido;
            totais.perdas += linha.perdas;
            totais.vendido += linha.vendido;
            totais.disponivel += linha.disponivel;
            totais.valor_disponivel += &linha.valor_venda * &BigDecimal::from(linha.disponivel);
            totais
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ResumoEstoque {
    pub produtos: Vec<ResumoProduto>,
    pub totais: TotaisEstoque,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linha(conferido: i64, perdas: i64, vendido: i64, preco: i32) -> ResumoProduto {
        ResumoProduto {
            produto_id: 1,
            descricao: "x".into(),
            categoria: None,
            quantidade_recebida: conferido,
            conferido,
            perdas,
            vendido,
            disponivel: conferido - perdas - vendido,
            valor_venda: BigDecimal::from(preco),
            movimentacoes: 1,
        }
    }

    #[test]
    fn totais_somam_quantidades_e_valor_disponivel() {
        let totais = TotaisEstoque::somar(&[linha(10, 1, 4, 2), linha(5, 0, 0, 3)]);
        assert_eq!(totais.produtos, 2);
        assert_eq!(totais.disponivel, 10);
        assert_eq!(totais.valor_disponivel, BigDecimal::from(5 * 2 + 5 * 3));
    }
}
