// src/vendas/calculo_venda.rs

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, Zero};

use super::vendas_structs::ItemVenda;
use crate::shared::erro::AppError;

/// Soma as quantidades de itens repetidos do mesmo produto.
///
/// O resultado sai em ordem crescente de `produto_id`, a mesma ordem em que
/// as linhas dos produtos são bloqueadas.
pub fn agrupar_itens(itens: &[ItemVenda]) -> Result<Vec<(i32, i32)>, AppError> {
    let mut agrupados: BTreeMap<i32, i32> = BTreeMap::new();
    for item in itens {
        let atual = agrupados.entry(item.produto_id).or_insert(0);
        *atual = atual.checked_add(item.quantidade).ok_or_else(|| {
            AppError::validacao(format!("Quantidade excessiva para o produto {}.", item.produto_id))
        })?;
    }
    Ok(agrupados.into_iter().collect())
}

/// Linha da venda já precificada.
#[derive(Debug, Clone, PartialEq)]
pub struct LinhaVenda {
    pub produto_id: i32,
    pub quantidade: i32,
    pub valor_unitario: BigDecimal,
    pub subtotal: BigDecimal,
}

impl LinhaVenda {
    pub fn new(produto_id: i32, quantidade: i32, valor_unitario: BigDecimal) -> Self {
        let subtotal = &valor_unitario * &BigDecimal::from(quantidade);
        LinhaVenda { produto_id, quantidade, valor_unitario, subtotal }
    }
}

/// Total da venda: soma dos subtotais menos o desconto.
pub fn calcular_total(linhas: &[LinhaVenda], desconto: &BigDecimal) -> Result<BigDecimal, AppError> {
    if *desconto < BigDecimal::zero() {
        return Err(AppError::validacao("O desconto não pode ser negativo."));
    }

    let bruto = linhas.iter().fold(BigDecimal::zero(), |soma, linha| soma + &linha.subtotal);
    if *desconto > bruto {
        return Err(AppError::regra_negocio(format!(
            "Desconto ({}) maior que o valor dos itens ({}).",
            desconto, bruto
        )));
    }
    Ok(bruto - desconto)
}

/// Faturamento dividido pelo número de vendas, com duas casas.
pub fn ticket_medio(faturamento: &BigDecimal, quantidade_vendas: i64) -> BigDecimal {
    if quantidade_vendas <= 0 {
        return BigDecimal::zero().with_scale(2);
    }
    (faturamento / &BigDecimal::from(quantidade_vendas)).with_scale(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn item(produto_id: i32, quantidade: i32) -> ItemVenda {
        ItemVenda { produto_id, quantidade }
    }

    fn valor(texto: &str) -> BigDecimal {
        BigDecimal::from_str(texto).unwrap()
    }

    #[test]
    fn itens_repetidos_sao_somados_em_ordem_de_id() {
        let agrupados = agrupar_itens(&[item(9, 1), item(3, 2), item(9, 4)]).unwrap();
        assert_eq!(agrupados, vec![(3, 2), (9, 5)]);
    }

    #[test]
    fn soma_que_estoura_i32_e_rejeitada() {
        assert!(agrupar_itens(&[item(1, i32::MAX), item(1, 1)]).is_err());
    }

    #[test]
    fn total_desconta_do_bruto() {
        let linhas = vec![LinhaVenda::new(1, 3, valor("2.50")), LinhaVenda::new(2, 1, valor("10.00"))];
        assert_eq!(linhas[0].subtotal, valor("7.50"));
        assert_eq!(calcular_total(&linhas, &valor("0.50")).unwrap(), valor("17.00"));
        assert_eq!(calcular_total(&linhas, &valor("17.50")).unwrap(), BigDecimal::zero());
    }

    #[test]
    fn desconto_fora_dos_limites_e_recusado() {
        let linhas = vec![LinhaVenda::new(1, 1, valor("5.00"))];
        assert!(matches!(calcular_total(&linhas, &valor("-1")), Err(AppError::Validacao { .. })));
        assert!(matches!(calcular_total(&linhas, &valor("5.01")), Err(AppError::RegraNegocio(_))));
    }

    #[test]
    fn ticket_medio_sem_vendas_e_zero() {
        assert_eq!(ticket_medio(&valor("100"), 0), BigDecimal::zero());
        assert_eq!(ticket_medio(&valor("100"), 3), valor("33.33"));
    }
}
