// src/produtos/importacao.rs

//! Reconciliação das linhas importadas com o catálogo.
//!
//! Nada aqui toca o banco: `reconciliar` recebe o índice do catálogo e um lote
//! de linhas e devolve o plano (inserções, atualizações e rejeições). Quem
//! aplica o plano e controla a transação é `importacao_router`.

use std::collections::{BTreeMap, HashMap};

use bigdecimal::BigDecimal;
use serde::Serialize;

/// Linha válida lida da planilha.
#[derive(Debug, Clone, PartialEq)]
pub struct LinhaImportacao {
    /// Número da linha na planilha (1 = cabeçalho).
    pub linha: usize,
    pub descricao: String,
    pub quantidade: i32,
    pub valor_custo: BigDecimal,
    pub valor_venda: BigDecimal,
    pub categoria: Option<String>,
    pub codigo_barras: Option<String>,
    pub codigo_barras_2: Option<String>,
}

impl LinhaImportacao {
    fn codigos(&self) -> impl Iterator<Item = &str> {
        self.codigo_barras
            .as_deref()
            .into_iter()
            .chain(self.codigo_barras_2.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErroLinha {
    pub linha: usize,
    pub mensagem: String,
}

impl std::fmt::Display for ErroLinha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Linha {}: {}", self.linha, self.mensagem)
    }
}

/// Chave de comparação de descrições: sem espaços nas pontas, minúscula e
/// com espaços internos colapsados.
pub fn normalizar_descricao(descricao: &str) -> String {
    descricao
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Índice do catálogo por descrição normalizada e por qualquer código de barras,
/// com a quantidade atual de cada produto.
#[derive(Debug, Default)]
pub struct IndiceProdutos {
    por_descricao: HashMap<String, i32>,
    por_codigo: HashMap<String, i32>,
    quantidades: HashMap<i32, i64>,
}

impl IndiceProdutos {
    pub fn registrar<'a>(
        &mut self,
        id: i32,
        descricao: &str,
        quantidade: i32,
        codigos: impl IntoIterator<Item = &'a str>,
    ) {
        self.por_descricao.entry(normalizar_descricao(descricao)).or_insert(id);
        for codigo in codigos {
            let codigo = codigo.trim();
            if !codigo.is_empty() {
                self.por_codigo.entry(codigo.to_string()).or_insert(id);
            }
        }
        self.quantidades.insert(id, i64::from(quantidade));
    }

    /// Aplica ao índice um incremento já gravado.
    pub fn somar(&mut self, id: i32, delta: i64) {
        *self.quantidades.entry(id).or_insert(0) += delta;
    }

    fn quantidade(&self, id: i32) -> i64 {
        self.quantidades.get(&id).copied().unwrap_or(0)
    }

    /// Localiza o produto da linha: código 1, código 2 e, por fim, descrição.
    pub fn localizar(&self, linha: &LinhaImportacao) -> Option<i32> {
        linha
            .codigos()
            .find_map(|codigo| self.por_codigo.get(codigo).copied())
            .or_else(|| self.por_descricao.get(&normalizar_descricao(&linha.descricao)).copied())
    }

    pub fn len(&self) -> usize {
        self.por_descricao.len()
    }
}

/// Produto a ser criado pelo lote.
#[derive(Debug, Clone, PartialEq)]
pub struct NovoProdutoImportado {
    pub descricao: String,
    pub quantidade: i32,
    pub valor_custo: BigDecimal,
    pub valor_venda: BigDecimal,
    pub categoria: Option<String>,
    pub codigo_barras: Option<String>,
    pub codigo_barras_2: Option<String>,
}

/// Resultado da reconciliação de um lote.
#[derive(Debug, Default)]
pub struct PlanoLote {
    pub insercoes: Vec<NovoProdutoImportado>,
    /// Incremento de quantidade por produto existente, em ordem de id.
    pub atualizacoes: Vec<(i32, i64)>,
    pub rejeicoes: Vec<ErroLinha>,
    /// Linhas somadas a um produto existente ou a uma inserção do próprio lote.
    pub linhas_atualizacao: usize,
}

impl PlanoLote {
    /// Linhas aceitas (viram inserção ou atualização).
    pub fn linhas_aceitas(&self) -> usize {
        self.insercoes.len() + self.linhas_atualizacao
    }
}

/// Decide o destino de cada linha do lote.
///
/// Linhas ainda não vistas viram inserções e passam a casar com as linhas
/// seguintes do mesmo lote; o índice do catálogo só é alterado depois do
/// commit, por quem aplica o plano.
pub fn reconciliar(indice: &IndiceProdutos, linhas: Vec<Result<LinhaImportacao, ErroLinha>>) -> PlanoLote {
    let mut plano = PlanoLote::default();
    let mut incrementos: BTreeMap<i32, i64> = BTreeMap::new();
    let mut pendentes = IndicePendentes::default();

    for linha in linhas {
        let linha = match linha {
            Ok(linha) => linha,
            Err(erro) => {
                plano.rejeicoes.push(erro);
                continue;
            }
        };

        if let Some(id) = indice.localizar(&linha) {
            let incremento = incrementos.get(&id).copied().unwrap_or(0) + i64::from(linha.quantidade);
            if indice.quantidade(id) + incremento > i64::from(i32::MAX) {
                plano.rejeicoes.push(excede_limite(linha.linha));
            } else {
                incrementos.insert(id, incremento);
                plano.linhas_atualizacao += 1;
            }
            continue;
        }

        if let Some(posicao) = pendentes.localizar(&linha) {
            let pendente = &mut plano.insercoes[posicao];
            match pendente.quantidade.checked_add(linha.quantidade) {
                Some(soma) => {
                    pendente.quantidade = soma;
                    plano.linhas_atualizacao += 1;
                }
                None => plano.rejeicoes.push(excede_limite(linha.linha)),
            }
            continue;
        }

        pendentes.registrar(plano.insercoes.len(), &linha);
        plano.insercoes.push(NovoProdutoImportado {
            descricao: linha.descricao,
            quantidade: linha.quantidade,
            valor_custo: linha.valor_custo,
            valor_venda: linha.valor_venda,
            categoria: linha.categoria,
            codigo_barras: linha.codigo_barras,
            codigo_barras_2: linha.codigo_barras_2,
        });
    }

    plano.atualizacoes = incrementos.into_iter().filter(|(_, delta)| *delta != 0).collect();
    plano
}

fn excede_limite(linha: usize) -> ErroLinha {
    ErroLinha {
        linha,
        mensagem: "quantidade acumulada excede o limite permitido".to_string(),
    }
}

/// Índice das inserções ainda não gravadas (posição em `PlanoLote::insercoes`).
#[derive(Default)]
struct IndicePendentes {
    por_descricao: HashMap<String, usize>,
    por_codigo: HashMap<String, usize>,
}

impl IndicePendentes {
    fn registrar(&mut self, posicao: usize, linha: &LinhaImportacao) {
        self.por_descricao.entry(normalizar_descricao(&linha.descricao)).or_insert(posicao);
        for codigo in linha.codigos() {
            self.por_codigo.entry(codigo.to_string()).or_insert(posicao);
        }
    }

    fn localizar(&self, linha: &LinhaImportacao) -> Option<usize> {
        linha
            .codigos()
            .find_map(|codigo| self.por_codigo.get(codigo).copied())
            .or_else(|| self.por_descricao.get(&normalizar_descricao(&linha.descricao)).copied())
    }
}

/// Máximo de mensagens de erro devolvidas na resposta.
pub const LIMITE_ERROS_RESPOSTA: usize = 50;

/// Totais devolvidos por `POST /products/import`.
#[derive(Debug, Default, Serialize)]
pub struct ResultadoImportacao {
    pub total_linhas: usize,
    pub criados: usize,
    pub atualizados: usize,
    pub sucesso: usize,
    pub falhas: usize,
    pub lotes_processados: usize,
    pub lotes_com_falha: usize,
    pub erros: Vec<String>,
    pub erros_omitidos: usize,
}

impl ResultadoImportacao {
    pub fn new(total_linhas: usize) -> Self {
        ResultadoImportacao { total_linhas, ..Default::default() }
    }

    pub fn registrar_erro(&mut self, mensagem: String) {
        if self.erros.len() < LIMITE_ERROS_RESPOSTA {
            self.erros.push(mensagem);
        } else {
            self.erros_omitidos += 1;
        }
    }

    /// Lote gravado: conta as linhas aceitas e as rejeitadas na validação.
    pub fn lote_gravado(&mut self, plano: &PlanoLote) {
        self.lotes_processados += 1;
        self.criados += plano.insercoes.len();
        self.atualizados += plano.linhas_atualizacao;
        self.sucesso += plano.linhas_aceitas();
        self.registrar_rejeicoes(plano);
    }

    /// Lote desfeito: todas as linhas aceitas do lote passam a ser falhas.
    pub fn lote_falhou(&mut self, numero_lote: usize, plano: &PlanoLote, motivo: &str) {
        self.lotes_processados += 1;
        self.lotes_com_falha += 1;
        self.falhas += plano.linhas_aceitas();
        self.registrar_erro(format!(
            "Lote {}: {} linha(s) não gravada(s): {}",
            numero_lote,
            plano.linhas_aceitas(),
            motivo
        ));
        self.registrar_rejeicoes(plano);
    }

    fn registrar_rejeicoes(&mut self, plano: &PlanoLote) {
        self.falhas += plano.rejeicoes.len();
        for rejeicao in &plano.rejeicoes {
            self.registrar_erro(rejeicao.to_string());
        }
    }
}
