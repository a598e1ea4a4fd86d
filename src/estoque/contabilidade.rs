// src/estoque/contabilidade.rs

//! Contabilidade de estoque.
//!
//! O saldo disponível nunca é gravado: é sempre `conferido - perdas - vendido`,
//! recalculado a partir das movimentações e do contador de vendidos.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

use crate::shared::erro::AppError;

/// Subconsulta com o saldo de todos os produtos (uma linha por produto).
///
/// Colunas: `produto_id, conferido, perdas, vendido, disponivel, movimentacoes`.
pub const SQL_SALDOS: &str = "\
    SELECT p.id AS produto_id, \
           COALESCE(m.conferido, 0)::BIGINT AS conferido, \
           COALESCE(m.perdas, 0)::BIGINT AS perdas, \
           COALESCE(pv.quantidade_vendida, 0)::BIGINT AS vendido, \
           (COALESCE(m.conferido, 0) - COALESCE(m.perdas, 0) - COALESCE(pv.quantidade_vendida, 0))::BIGINT AS disponivel, \
           COALESCE(m.movimentacoes, 0)::BIGINT AS movimentacoes \
    FROM products p \
    LEFT JOIN ( \
        SELECT produto_id, \
               SUM(quantidade) FILTER (WHERE tipo = 'conferido') AS conferido, \
               SUM(quantidade) FILTER (WHERE tipo = 'perda') AS perdas, \
               COUNT(*) AS movimentacoes \
        FROM estoque GROUP BY produto_id \
    ) m ON m.produto_id = p.id \
    LEFT JOIN produto_vendas pv ON pv.produto_id = p.id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoMovimentacao {
    Conferido,
    Perda,
}

impl TipoMovimentacao {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipoMovimentacao::Conferido => "conferido",
            TipoMovimentacao::Perda => "perda",
        }
    }

    pub fn from_db(valor: &str) -> Option<Self> {
        match valor {
            "conferido" => Some(TipoMovimentacao::Conferido),
            "perda" => Some(TipoMovimentacao::Perda),
            _ => None,
        }
    }
}

/// Saldo de um produto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct Saldo {
    pub conferido: i64,
    pub perdas: i64,
    pub vendido: i64,
}

impl Saldo {
    pub fn disponivel(&self) -> i64 {
        self.conferido - self.perdas - self.vendido
    }

    /// Verifica se uma nova movimentação pode ser registrada.
    ///
    /// `conferido` é limitado pela quantidade total recebida do produto;
    /// `perda` não pode deixar o disponível negativo.
    pub fn validar_movimentacao(
        &self,
        produto: &ProdutoBloqueado,
        tipo: TipoMovimentacao,
        quantidade: i64,
    ) -> Result<(), AppError> {
        if quantidade <= 0 {
            return Err(AppError::validacao("A quantidade deve ser maior que zero."));
        }

        match tipo {
            TipoMovimentacao::Conferido => {
                let recebido = i64::from(produto.quantidade);
                if self.conferido + quantidade > recebido {
                    return Err(AppError::regra_negocio(format!(
                        "Conferência excede a quantidade recebida de '{}': recebido {}, já conferido {}, solicitado {}.",
                        produto.descricao, recebido, self.conferido, quantidade
                    )));
                }
            }
            TipoMovimentacao::Perda => self.exigir_disponivel(produto, quantidade)?,
        }
        Ok(())
    }

    /// Verifica se uma movimentação existente pode ser excluída.
    pub fn validar_remocao(
        &self,
        produto: &ProdutoBloqueado,
        tipo: TipoMovimentacao,
        quantidade: i64,
    ) -> Result<(), AppError> {
        match tipo {
            // Remover uma conferência reduz o disponível
            TipoMovimentacao::Conferido => self.exigir_disponivel(produto, quantidade),
            TipoMovimentacao::Perda => Ok(()),
        }
    }

    /// Falha com `EstoqueInsuficiente` se `quantidade` passar do disponível.
    pub fn exigir_disponivel(&self, produto: &ProdutoBloqueado, quantidade: i64) -> Result<(), AppError> {
        let disponivel = self.disponivel();
        if quantidade > disponivel {
            return Err(AppError::EstoqueInsuficiente {
                produto_id: produto.id,
                produto: produto.descricao.clone(),
                solicitado: quantidade,
                disponivel,
            });
        }
        Ok(())
    }
}

/// Linha do produto lida com `FOR UPDATE`.
#[derive(Debug, Clone, FromRow)]
pub struct ProdutoBloqueado {
    pub id: i32,
    pub descricao: String,
    pub quantidade: i32,
    pub valor_venda: BigDecimal,
}

/// Bloqueia a linha do produto até o fim da transação.
///
/// Vendas e movimentações do mesmo produto ficam serializadas por esse bloqueio.
pub async fn bloquear_produto(
    conn: &mut PgConnection,
    produto_id: i32,
) -> Result<Option<ProdutoBloqueado>, sqlx::Error> {
    sqlx::query_as::<_, ProdutoBloqueado>(
        "SELECT id, descricao, quantidade, valor_venda FROM products WHERE id = $1 FOR UPDATE",
    )
    .bind(produto_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Recalcula o saldo de um produto.
pub async fn carregar_saldo(conn: &mut PgConnection, produto_id: i32) -> Result<Saldo, sqlx::Error> {
    sqlx::query_as::<_, Saldo>(
        "SELECT \
             COALESCE(SUM(quantidade) FILTER (WHERE tipo = 'conferido'), 0)::BIGINT AS conferido, \
             COALESCE(SUM(quantidade) FILTER (WHERE tipo = 'perda'), 0)::BIGINT AS perdas, \
             COALESCE((SELECT quantidade_vendida FROM produto_vendas WHERE produto_id = $1), 0)::BIGINT AS vendido \
         FROM estoque WHERE produto_id = $1",
    )
    .bind(produto_id)
    .fetch_one(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn produto(quantidade: i32) -> ProdutoBloqueado {
        ProdutoBloqueado {
            id: 1,
            descricao: "Widget A".to_string(),
            quantidade,
            valor_venda: BigDecimal::from(10),
        }
    }

    #[test]
    fn disponivel_desconta_perdas_e_vendidos() {
        let saldo = Saldo { conferido: 10, perdas: 2, vendido: 5 };
        assert_eq!(saldo.disponivel(), 3);
    }

    #[test]
    fn conferencia_limitada_pela_quantidade_recebida() {
        let saldo = Saldo { conferido: 8, perdas: 0, vendido: 0 };
        assert!(saldo.validar_movimentacao(&produto(10), TipoMovimentacao::Conferido, 2).is_ok());
        let erro = saldo
            .validar_movimentacao(&produto(10), TipoMovimentacao::Conferido, 3)
            .unwrap_err();
        assert!(matches!(erro, AppError::RegraNegocio(_)));
    }

    #[test]
    fn perda_nao_pode_deixar_saldo_negativo() {
        let saldo = Saldo { conferido: 10, perdas: 0, vendido: 7 };
        assert!(saldo.validar_movimentacao(&produto(10), TipoMovimentacao::Perda, 3).is_ok());
        match saldo.validar_movimentacao(&produto(10), TipoMovimentacao::Perda, 4) {
            Err(AppError::EstoqueInsuficiente { solicitado, disponivel, .. }) => {
                assert_eq!((solicitado, disponivel), (4, 3));
            }
            outro => panic!("esperava EstoqueInsuficiente, veio {:?}", outro),
        }
    }

    #[test]
    fn quantidade_deve_ser_positiva() {
        let saldo = Saldo::default();
        for quantidade in [0, -1] {
            let erro = saldo
                .validar_movimentacao(&produto(10), TipoMovimentacao::Conferido, quantidade)
                .unwrap_err();
            assert!(matches!(erro, AppError::Validacao { .. }));
        }
    }

    #[test]
    fn venda_de_sete_e_depois_cinco() {
        // conferido 10, perda 0: vende 7, sobra 3; pedido de 5 é recusado informando 3
        let mut saldo = Saldo { conferido: 10, perdas: 0, vendido: 0 };
        assert!(saldo.exigir_disponivel(&produto(10), 7).is_ok());
        saldo.vendido += 7;
        assert_eq!(saldo.disponivel(), 3);

        match saldo.exigir_disponivel(&produto(10), 5) {
            Err(AppError::EstoqueInsuficiente { solicitado: 5, disponivel: 3, .. }) => {}
            outro => panic!("esperava EstoqueInsuficiente, veio {:?}", outro),
        }
        assert_eq!(saldo.disponivel(), 3);
    }

    #[test]
    fn remover_conferencia_exige_saldo_e_remover_perda_sempre_pode() {
        let saldo = Saldo { conferido: 10, perdas: 1, vendido: 6 };
        assert!(saldo.validar_remocao(&produto(10), TipoMovimentacao::Conferido, 3).is_ok());
        assert!(saldo.validar_remocao(&produto(10), TipoMovimentacao::Conferido, 4).is_err());
        assert!(saldo.validar_remocao(&produto(10), TipoMovimentacao::Perda, 1).is_ok());
    }
}
