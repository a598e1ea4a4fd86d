// src/clientes/clientes_structs.rs

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Dias de validade da adesão.
pub const DIAS_VALIDADE_ADESAO: i64 = 365;

/// Cliente ativo: menos de 365 dias desde a adesão. No 365º dia já está inativo.
pub fn cliente_ativo(data_adesao: NaiveDate, hoje: NaiveDate) -> bool {
    (hoje - data_adesao).num_days() < DIAS_VALIDADE_ADESAO
}

/// Dias até o fim da adesão (0 se já venceu).
pub fn dias_restantes(data_adesao: NaiveDate, hoje: NaiveDate) -> i64 {
    (DIAS_VALIDADE_ADESAO - (hoje - data_adesao).num_days()).clamp(0, DIAS_VALIDADE_ADESAO)
}

#[derive(Debug, Serialize, FromRow)]
pub struct Cliente {
    pub id: i32,
    pub nome: String,
    pub cpf: String,
    pub telefone: Option<String>,
    pub data_adesao: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const COLUNAS_CLIENTE: &str = "c.id, c.nome, c.cpf, c.telefone, c.data_adesao, c.created_at, c.updated_at";

/// Cliente com a situação da adesão calculada na leitura.
#[derive(Debug, Serialize)]
pub struct ClienteResponse {
    #[serde(flatten)]
    pub cliente: Cliente,
    pub ativo: bool,
    pub dias_restantes: i64,
    pub data_vencimento: NaiveDate,
}

impl ClienteResponse {
    pub fn new(cliente: Cliente, hoje: NaiveDate) -> Self {
        ClienteResponse {
            ativo: cliente_ativo(cliente.data_adesao, hoje),
            dias_restantes: dias_restantes(cliente.data_adesao, hoje),
            data_vencimento: cliente.data_adesao + Duration::days(DIAS_VALIDADE_ADESAO),
            cliente,
        }
    }
}

/// Cadastro e atualização; sem `data_adesao` vale hoje (POST) ou a data atual do cadastro (PUT).
#[derive(Debug, Deserialize, Validate)]
pub struct DadosCliente {
    #[validate(length(min = 2, max = 150, message = "Nome deve ter entre 2 e 150 caracteres"))]
    pub nome: String,
    pub cpf: String,
    #[validate(length(max = 20, message = "Telefone com no máximo 20 caracteres"))]
    pub telefone: Option<String>,
    #[serde(default)]
    pub data_adesao: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCliente {
    Ativo,
    Inativo,
}

impl StatusCliente {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCliente::Ativo => "ativo",
            StatusCliente::Inativo => "inativo",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FiltroClientes {
    pub busca: Option<String>,
    pub status: Option<StatusCliente>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(texto: &str) -> NaiveDate {
        NaiveDate::parse_from_str(texto, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn adesao_vale_por_364_dias_completos() {
        let adesao = data("2024-01-10");
        assert!(cliente_ativo(adesao, adesao));
        assert!(cliente_ativo(adesao, adesao + Duration::days(364)));
        assert!(!cliente_ativo(adesao, adesao + Duration::days(365)));
    }

    #[test]
    fn dias_restantes_nunca_fica_negativo() {
        let adesao = data("2024-01-10");
        assert_eq!(dias_restantes(adesao, adesao), 365);
        assert_eq!(dias_restantes(adesao, adesao + Duration::days(364)), 1);
        assert_eq!(dias_restantes(adesao, adesao + Duration::days(365)), 0);
        assert_eq!(dias_restantes(adesao, adesao + Duration::days(800)), 0);
    }

    #[test]
    fn resposta_inclui_situacao_e_vencimento() {
        let agora = Utc::now();
        let cliente = Cliente {
            id: 1,
            nome: "Maria".into(),
            cpf: "52998224725".into(),
            telefone: None,
            data_adesao: data("2023-03-01"),
            created_at: agora,
            updated_at: agora,
        };
        let resposta = ClienteResponse::new(cliente, data("2024-03-01"));
        // 2024 é bissexto: 366 dias depois
        assert!(!resposta.ativo);
        assert_eq!(resposta.data_vencimento, data("2024-02-29"));

        let json = serde_json::to_value(&resposta).unwrap();
        assert_eq!(json["nome"], "Maria");
        assert_eq!(json["dias_restantes"], 0);
    }
}
