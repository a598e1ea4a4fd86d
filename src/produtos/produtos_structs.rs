// src/produtos/produtos_structs.rs

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::shared::erro::AppError;

/// Estrutura que representa um produto no banco de dados.
///
/// `quantidade` é o total recebido ao longo da vida do produto, não o estoque atual.
#[derive(Debug, Serialize, FromRow)]
pub struct Produto {
    pub id: i32,
    pub descricao: String,
    pub quantidade: i32,
    pub valor_custo: BigDecimal,
    pub valor_venda: BigDecimal,
    pub categoria: Option<String>,
    pub codigo_barras: Option<String>,
    pub codigo_barras_2: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Colunas de `Produto`, qualificadas com o alias `p`.
pub const COLUNAS_PRODUTO: &str = "p.id, p.descricao, p.quantidade, p.valor_custo, p.valor_venda, \
    p.categoria, p.codigo_barras, p.codigo_barras_2, p.created_at, p.updated_at";

/// Produto com o saldo de estoque calculado.
#[derive(Debug, Serialize, FromRow)]
pub struct ProdutoComSaldo {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub produto: Produto,
    pub conferido: i64,
    pub perdas: i64,
    pub vendido: i64,
    pub disponivel: i64,
    pub movimentacoes: i64,
}

/// Primeiro valor que não cabe em `NUMERIC(12,2)`.
const LIMITE_PRECO: i64 = 10_000_000_000;

/// Arredonda para centavos. `None` se negativo ou grande demais para a coluna.
pub fn ajustar_preco(valor: &BigDecimal) -> Option<BigDecimal> {
    let arredondado = valor.round(2);
    (arredondado >= BigDecimal::zero() && arredondado < BigDecimal::from(LIMITE_PRECO)).then_some(arredondado)
}

/// Dados de cadastro/atualização (POST e PUT substituem todos os campos).
#[derive(Debug, Deserialize, Validate)]
pub struct DadosProduto {
    #[validate(length(min = 2, max = 255, message = "Descrição deve ter entre 2 e 255 caracteres"))]
    pub descricao: String,
    #[validate(range(min = 0, message = "Quantidade não pode ser negativa"))]
    pub quantidade: i32,
    #[serde(default)]
    pub valor_custo: Option<BigDecimal>,
    pub valor_venda: BigDecimal,
    #[validate(length(max = 100, message = "Categoria com no máximo 100 caracteres"))]
    pub categoria: Option<String>,
    #[validate(length(max = 50, message = "Código de barras com no máximo 50 caracteres"))]
    pub codigo_barras: Option<String>,
    #[validate(length(max = 50, message = "Código de barras com no máximo 50 caracteres"))]
    pub codigo_barras_2: Option<String>,
}

impl DadosProduto {
    /// Valida e devolve os dados aparados (strings vazias viram `None`).
    pub fn normalizar(self) -> Result<DadosProduto, AppError> {
        self.validate()?;

        let descricao = self.descricao.trim().to_string();
        if descricao.chars().count() < 2 {
            return Err(AppError::validacao("Descrição deve ter pelo menos 2 caracteres."));
        }

        let fora_do_intervalo = || AppError::validacao("Valores devem estar entre 0 e 9.999.999.999,99.");
        let valor_custo = self.valor_custo.unwrap_or_else(BigDecimal::zero);
        let valor_custo = ajustar_preco(&valor_custo).ok_or_else(fora_do_intervalo)?;
        let valor_venda = ajustar_preco(&self.valor_venda).ok_or_else(fora_do_intervalo)?;

        let codigo_barras = texto_opcional(self.codigo_barras);
        let codigo_barras_2 = texto_opcional(self.codigo_barras_2);
        if codigo_barras.is_some() && codigo_barras == codigo_barras_2 {
            return Err(AppError::validacao("Os dois códigos de barras não podem ser iguais."));
        }

        Ok(DadosProduto {
            descricao,
            quantidade: self.quantidade,
            valor_custo: Some(valor_custo),
            valor_venda,
            categoria: texto_opcional(self.categoria),
            codigo_barras,
            codigo_barras_2,
        })
    }

    pub fn codigos(&self) -> Vec<String> {
        self.codigo_barras
            .iter()
            .chain(self.codigo_barras_2.iter())
            .cloned()
            .collect()
    }
}

pub fn texto_opcional(valor: Option<String>) -> Option<String> {
    valor.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct FiltroProdutos {
    pub categoria: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BuscaQuery {
    pub q: Option<String>,
}

/// Escapa `%`, `_` e `\` para uso seguro em `ILIKE`.
pub fn padrao_like(termo: &str) -> String {
    let mut escapado = String::with_capacity(termo.len() + 2);
    escapado.push('%');
    for c in termo.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escapado.push('\\');
        }
        escapado.push(c);
    }
    escapado.push('%');
    escapado
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dados(descricao: &str) -> DadosProduto {
        DadosProduto {
            descricao: descricao.to_string(),
            quantidade: 10,
            valor_custo: None,
            valor_venda: BigDecimal::from_str("9.90").unwrap(),
            categoria: Some("  ".into()),
            codigo_barras: Some(" 789 ".into()),
            codigo_barras_2: None,
        }
    }

    #[test]
    fn normalizar_apara_textos_e_preenche_custo() {
        let normalizado = dados("  Caderno  ").normalizar().unwrap();
        assert_eq!(normalizado.descricao, "Caderno");
        assert_eq!(normalizado.categoria, None);
        assert_eq!(normalizado.codigo_barras.as_deref(), Some("789"));
        assert_eq!(normalizado.valor_custo, Some(BigDecimal::zero()));
        assert_eq!(normalizado.codigos(), vec!["789".to_string()]);
    }

    #[test]
    fn rejeita_descricao_curta_depois_de_aparar() {
        assert!(dados("  a    ").normalizar().is_err());
    }

    #[test]
    fn rejeita_preco_negativo_e_codigos_repetidos() {
        let mut negativo = dados("Caneta");
        negativo.valor_venda = BigDecimal::from(-1);
        assert!(negativo.normalizar().is_err());

        let mut repetido = dados("Caneta");
        repetido.codigo_barras_2 = Some("789".into());
        assert!(repetido.normalizar().is_err());
    }

    #[test]
    fn preco_que_estoura_a_coluna_e_erro_de_validacao() {
        let mut caro = dados("Caneta");
        caro.valor_venda = BigDecimal::from_str("10000000000").unwrap();
        assert!(matches!(caro.normalizar(), Err(AppError::Validacao { .. })));

        let mut custo = dados("Caneta");
        custo.valor_custo = Some(BigDecimal::from_str("9999999999.995").unwrap());
        assert!(custo.normalizar().is_err());

        let mut centavos = dados("Caneta");
        centavos.valor_venda = BigDecimal::from_str("3.456").unwrap();
        assert_eq!(centavos.normalizar().unwrap().valor_venda, BigDecimal::from_str("3.46").unwrap());
    }

    #[test]
    fn padrao_like_escapa_curingas() {
        assert_eq!(padrao_like("50%_off"), "%50\\%\\_off%");
    }
}
