// src/usuarios/permissoes.rs

//! Papéis e permissões.
//!
//! - admin: acesso irrestrito
//! - manager: `estoque` e `relatorios` automáticos, demais conforme as flags salvas
//! - employee: somente as flags salvas
//! - `dashboard` é sempre liberado para qualquer usuário

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};

/// Papel do usuário, gravado na coluna `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Papel {
    Admin,
    Manager,
    Employee,
}

impl Papel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Papel::Admin => "admin",
            Papel::Manager => "manager",
            Papel::Employee => "employee",
        }
    }

    pub fn from_db(valor: &str) -> Option<Self> {
        match valor {
            "admin" => Some(Papel::Admin),
            "manager" => Some(Papel::Manager),
            "employee" => Some(Papel::Employee),
            _ => None,
        }
    }

    /// Admin e manager administram usuários.
    pub fn gestor(&self) -> bool {
        matches!(self, Papel::Admin | Papel::Manager)
    }
}

/// Permissões verificáveis pelas rotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissao {
    Dashboard,
    Produtos,
    Estoque,
    Vendas,
    Clientes,
    Relatorios,
}

impl Permissao {
    pub const TODAS: [Permissao; 6] = [
        Permissao::Dashboard,
        Permissao::Produtos,
        Permissao::Estoque,
        Permissao::Vendas,
        Permissao::Clientes,
        Permissao::Relatorios,
    ];

    pub fn chave(&self) -> &'static str {
        match self {
            Permissao::Dashboard => "dashboard",
            Permissao::Produtos => "produtos",
            Permissao::Estoque => "estoque",
            Permissao::Vendas => "vendas",
            Permissao::Clientes => "clientes",
            Permissao::Relatorios => "relatorios",
        }
    }

    fn from_chave(chave: &str) -> Option<Self> {
        Permissao::TODAS.into_iter().find(|p| p.chave() == chave)
    }
}

/// Flags de permissão armazenadas em `users.permissions` (JSONB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissoes {
    pub dashboard: bool,
    pub produtos: bool,
    pub estoque: bool,
    pub vendas: bool,
    pub clientes: bool,
    pub relatorios: bool,
}

impl Default for Permissoes {
    /// Conjunto seguro: somente o dashboard.
    fn default() -> Self {
        Permissoes {
            dashboard: true,
            produtos: false,
            estoque: false,
            vendas: false,
            clientes: false,
            relatorios: false,
        }
    }
}

impl Permissoes {
    pub fn flag(&self, permissao: Permissao) -> bool {
        match permissao {
            Permissao::Dashboard => self.dashboard,
            Permissao::Produtos => self.produtos,
            Permissao::Estoque => self.estoque,
            Permissao::Vendas => self.vendas,
            Permissao::Clientes => self.clientes,
            Permissao::Relatorios => self.relatorios,
        }
    }

    fn definir(&mut self, permissao: Permissao, valor: bool) {
        match permissao {
            Permissao::Dashboard => self.dashboard = valor,
            Permissao::Produtos => self.produtos = valor,
            Permissao::Estoque => self.estoque = valor,
            Permissao::Vendas => self.vendas = valor,
            Permissao::Clientes => self.clientes = valor,
            Permissao::Relatorios => self.relatorios = valor,
        }
    }

    /// Garante as invariantes das flags salvas (`dashboard` sempre verdadeiro).
    pub fn normalizada(mut self) -> Self {
        self.dashboard = true;
        self
    }

    /// Flags efetivas para o papel, já com as concessões automáticas aplicadas.
    pub fn efetivas(&self, papel: Papel) -> Permissoes {
        let mut efetivas = *self;
        for permissao in Permissao::TODAS {
            efetivas.definir(permissao, permite(papel, self, permissao));
        }
        efetivas
    }

    /// Converte o valor bruto do banco em flags válidas.
    ///
    /// Retorna também se o valor precisou de reparo (para regravar a linha).
    pub fn reparar(bruto: &Value) -> (Permissoes, bool) {
        let reparadas = match bruto {
            Value::Object(mapa) => {
                let mut flags = Permissoes { dashboard: true, ..Permissoes::sem_flags() };
                for permissao in Permissao::TODAS {
                    if let Some(valor) = mapa.get(permissao.chave()).and_then(booleano) {
                        flags.definir(permissao, valor);
                    }
                }
                flags
            }
            // Lista de nomes: ["vendas", "clientes"]
            Value::Array(itens) => {
                let mut flags = Permissoes::default();
                for chave in itens.iter().filter_map(Value::as_str) {
                    if let Some(permissao) = Permissao::from_chave(chave) {
                        flags.definir(permissao, true);
                    }
                }
                flags
            }
            // JSON serializado duas vezes: "{\"vendas\": true}"
            Value::String(texto) => match serde_json::from_str::<Value>(texto) {
                Ok(interno @ (Value::Object(_) | Value::Array(_))) => Permissoes::reparar(&interno).0,
                _ => Permissoes::default(),
            },
            _ => Permissoes::default(),
        }
        .normalizada();

        let alterado = serde_json::to_value(reparadas).ok().as_ref() != Some(bruto);
        (reparadas, alterado)
    }

    fn sem_flags() -> Self {
        Permissoes {
            dashboard: false,
            produtos: false,
            estoque: false,
            vendas: false,
            clientes: false,
            relatorios: false,
        }
    }
}

fn booleano(valor: &Value) -> Option<bool> {
    match valor {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "sim" => Some(true),
            "false" | "0" | "nao" | "não" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Decide se um papel com as flags informadas tem acesso à permissão.
pub fn permite(papel: Papel, flags: &Permissoes, permissao: Permissao) -> bool {
    match (papel, permissao) {
        (Papel::Admin, _) => true,
        (_, Permissao::Dashboard) => true,
        (Papel::Manager, Permissao::Estoque | Permissao::Relatorios) => true,
        _ => flags.flag(permissao),
    }
}

/// Repara, uma única vez na inicialização, as permissões gravadas em formato inválido.
pub async fn reparar_permissoes_armazenadas(pool: &PgPool) -> Result<usize, sqlx::Error> {
    let linhas: Vec<(i32, Option<Value>)> = sqlx::query_as("SELECT id, permissions FROM users")
        .fetch_all(pool)
        .await?;

    let mut reparados = 0;
    for (id, bruto) in linhas {
        let (flags, alterado) = Permissoes::reparar(&bruto.unwrap_or(Value::Null));
        if !alterado {
            continue;
        }

        sqlx::query("UPDATE users SET permissions = $1 WHERE id = $2")
            .bind(sqlx::types::Json(flags))
            .bind(id)
            .execute(pool)
            .await?;
        warn!(usuario_id = id, "Permissões inválidas reparadas");
        reparados += 1;
    }

    if reparados > 0 {
        info!(reparados, "Migração de permissões concluída");
    }
    Ok(reparados)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flags(vendas: bool, relatorios: bool) -> Permissoes {
        Permissoes { vendas, relatorios, ..Permissoes::default() }
    }

    #[test]
    fn admin_tem_acesso_a_tudo() {
        let nenhuma = Permissoes::default();
        for permissao in Permissao::TODAS {
            assert!(permite(Papel::Admin, &nenhuma, permissao));
        }
    }

    #[test]
    fn dashboard_liberado_mesmo_com_flag_falsa() {
        let mut sem_dashboard = Permissoes::default();
        sem_dashboard.dashboard = false;
        assert!(permite(Papel::Employee, &sem_dashboard, Permissao::Dashboard));
    }

    #[test]
    fn manager_recebe_estoque_e_relatorios_automaticamente() {
        let nenhuma = Permissoes::default();
        assert!(permite(Papel::Manager, &nenhuma, Permissao::Estoque));
        assert!(permite(Papel::Manager, &nenhuma, Permissao::Relatorios));
        assert!(!permite(Papel::Manager, &nenhuma, Permissao::Vendas));
        assert!(permite(Papel::Manager, &flags(true, false), Permissao::Vendas));
    }

    #[test]
    fn employee_depende_das_flags_explicitas() {
        let vendedor = flags(true, false);
        assert!(permite(Papel::Employee, &vendedor, Permissao::Vendas));
        assert!(!permite(Papel::Employee, &vendedor, Permissao::Relatorios));
        assert!(!permite(Papel::Employee, &vendedor, Permissao::Estoque));
    }

    #[test]
    fn efetivas_aplica_concessoes_do_papel() {
        let efetivas = Permissoes::default().efetivas(Papel::Manager);
        assert!(efetivas.estoque && efetivas.relatorios && efetivas.dashboard);
        assert!(!efetivas.produtos);
    }

    #[test]
    fn objeto_valido_nao_precisa_de_reparo() {
        let bruto = serde_json::to_value(flags(true, true)).unwrap();
        let (reparadas, alterado) = Permissoes::reparar(&bruto);
        assert_eq!(reparadas, flags(true, true));
        assert!(!alterado);
    }

    #[test]
    fn reparo_forca_dashboard_e_converte_tipos() {
        let bruto = json!({ "dashboard": false, "vendas": "true", "clientes": 1, "produtos": "talvez" });
        let (reparadas, alterado) = Permissoes::reparar(&bruto);
        assert!(alterado);
        assert!(reparadas.dashboard);
        assert!(reparadas.vendas);
        assert!(reparadas.clientes);
        assert!(!reparadas.produtos);
    }

    #[test]
    fn reparo_aceita_lista_e_json_em_texto() {
        let (da_lista, _) = Permissoes::reparar(&json!(["vendas", "inexistente"]));
        assert!(da_lista.vendas && da_lista.dashboard && !da_lista.clientes);

        let (do_texto, alterado) = Permissoes::reparar(&json!("{\"clientes\": true}"));
        assert!(alterado);
        assert!(do_texto.clientes && do_texto.dashboard);
    }

    #[test]
    fn lixo_vira_conjunto_seguro() {
        for bruto in [Value::Null, json!(42), json!("não é json")] {
            let (reparadas, alterado) = Permissoes::reparar(&bruto);
            assert_eq!(reparadas, Permissoes::default());
            assert!(alterado);
        }
    }
}
