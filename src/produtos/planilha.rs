// src/produtos/planilha.rs

use std::io::Cursor;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use super::importacao::{ErroLinha, LinhaImportacao};
use super::produtos_structs::ajustar_preco;
use crate::shared::erro::AppError;

/// Colunas do modelo de importação: (cabeçalho, largura).
const COLUNAS_MODELO: [(&str, f64); 7] = [
    ("descricao", 40.0),
    ("quantidade", 12.0),
    ("valor_custo", 14.0),
    ("valor_venda", 14.0),
    ("categoria", 20.0),
    ("codigo_barras", 18.0),
    ("codigo_barras_2", 18.0),
];

/// Posição de cada coluna reconhecida no cabeçalho.
#[derive(Debug, Default, PartialEq, Eq)]
struct Colunas {
    descricao: usize,
    quantidade: Option<usize>,
    valor_custo: Option<usize>,
    valor_venda: Option<usize>,
    categoria: Option<usize>,
    codigo_barras: Option<usize>,
    codigo_barras_2: Option<usize>,
}

/// Cabeçalho em minúsculas, sem acentos e com `_` no lugar de espaços.
fn normalizar_cabecalho(texto: &str) -> String {
    texto
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            'ç' => 'c',
            ' ' | '-' | '.' => '_',
            outro => outro,
        })
        .collect()
}

fn mapear_cabecalho(cabecalho: &[Data]) -> Result<Colunas, AppError> {
    let nomes: Vec<String> = cabecalho
        .iter()
        .map(|celula| texto(celula).map(|t| normalizar_cabecalho(&t)).unwrap_or_default())
        .collect();

    let achar = |aliases: &[&str]| nomes.iter().position(|nome| aliases.contains(&nome.as_str()));

    let descricao = achar(&["descricao", "description", "produto", "nome"]).ok_or_else(|| {
        AppError::validacao("Planilha sem a coluna 'descricao' no cabeçalho (primeira linha).")
    })?;

    Ok(Colunas {
        descricao,
        quantidade: achar(&["quantidade", "qtd", "qtde", "quantity"]),
        valor_custo: achar(&["valor_custo", "custo", "preco_custo", "cost"]),
        valor_venda: achar(&["valor_venda", "preco", "preco_venda", "valor", "price"]),
        categoria: achar(&["categoria", "category"]),
        codigo_barras: achar(&["codigo_barras", "codigo_de_barras", "barcode", "ean"]),
        codigo_barras_2: achar(&["codigo_barras_2", "codigo_de_barras_2", "barcode2", "barcode_2", "ean2"]),
    })
}

/// Texto da célula (números inteiros sem o `.0`, útil para códigos de barras).
fn texto(celula: &Data) -> Option<String> {
    let valor = match celula {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        outro => outro.to_string(),
    };
    Some(valor).filter(|v| !v.is_empty())
}

/// `1.000`, `12.345.678`: pontos separando grupos de exatamente três dígitos.
fn milhar_agrupado(texto: &str) -> bool {
    let mut grupos = texto.split('.');
    let primeiro_ok = grupos
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()));
    let restantes: Vec<&str> = grupos.collect();
    primeiro_ok
        && !restantes.is_empty()
        && restantes.iter().all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

fn inteiro_de_texto(bruto: &str) -> Result<i64, String> {
    let limpo: String = bruto.chars().filter(|c| !c.is_whitespace()).collect();
    if milhar_agrupado(&limpo) {
        return limpo
            .replace('.', "")
            .parse::<i64>()
            .map_err(|_| format!("quantidade inválida '{}'", bruto));
    }

    let valor = BigDecimal::from_str(&limpo.replace(',', "."))
        .map_err(|_| format!("quantidade inválida '{}'", bruto))?;
    if !valor.is_integer() {
        return Err(format!("quantidade deve ser inteira (recebido {})", bruto));
    }
    valor.to_i64().ok_or_else(|| format!("quantidade inválida '{}'", bruto))
}

fn inteiro(celula: &Data) -> Result<Option<i64>, String> {
    match celula {
        Data::Empty => Ok(None),
        Data::Int(i) => Ok(Some(*i)),
        Data::Float(f) if f.fract() == 0.0 => Ok(Some(*f as i64)),
        Data::Float(f) => Err(format!("quantidade deve ser inteira (recebido {})", f)),
        outro => texto(outro).map(|t| inteiro_de_texto(&t)).transpose(),
    }
}

/// Converte valores como `12.5`, `"12,50"`, `"R$ 1.234,56"`.
fn decimal(celula: &Data) -> Result<Option<BigDecimal>, String> {
    match celula {
        Data::Empty => Ok(None),
        Data::Int(i) => Ok(Some(BigDecimal::from(*i))),
        Data::Float(f) => BigDecimal::from_str(&format!("{:.2}", f))
            .map(Some)
            .map_err(|_| format!("valor inválido '{}'", f)),
        outro => {
            let Some(bruto) = texto(outro) else {
                return Ok(None);
            };
            let limpo: String = bruto.replace("R$", "").chars().filter(|c| !c.is_whitespace()).collect();
            let normalizado = if limpo.contains(',') {
                limpo.replace('.', "").replace(',', ".")
            } else {
                limpo
            };
            BigDecimal::from_str(&normalizado)
                .map(Some)
                .map_err(|_| format!("valor inválido '{}'", bruto))
        }
    }
}

/// Converte uma linha de dados. `None` para linhas totalmente vazias.
fn converter_linha(numero: usize, celulas: &[Data], colunas: &Colunas) -> Option<Result<LinhaImportacao, ErroLinha>> {
    if celulas.iter().all(|c| texto(c).is_none()) {
        return None;
    }

    let celula = |posicao: Option<usize>| posicao.and_then(|p| celulas.get(p)).unwrap_or(&Data::Empty);
    let erro = |mensagem: String| ErroLinha { linha: numero, mensagem };

    let resultado = (|| {
        let descricao = texto(celula(Some(colunas.descricao))).unwrap_or_default();
        if descricao.chars().count() < 2 {
            return Err(erro("descrição deve ter pelo menos 2 caracteres".to_string()));
        }
        if descricao.chars().count() > 255 {
            return Err(erro("descrição deve ter no máximo 255 caracteres".to_string()));
        }

        let quantidade = inteiro(celula(colunas.quantidade)).map_err(erro)?.unwrap_or(0);
        let quantidade = i32::try_from(quantidade)
            .ok()
            .filter(|q| *q >= 0)
            .ok_or_else(|| erro(format!("quantidade inválida ({})", quantidade)))?;

        let preco = |posicao: Option<usize>| -> Result<BigDecimal, ErroLinha> {
            let valor = decimal(celula(posicao)).map_err(erro)?.unwrap_or_else(BigDecimal::zero);
            ajustar_preco(&valor).ok_or_else(|| erro(format!("valor fora do intervalo permitido ({})", valor)))
        };
        let valor_custo = preco(colunas.valor_custo)?;
        let valor_venda = preco(colunas.valor_venda)?;

        let codigo_barras = texto(celula(colunas.codigo_barras));
        let codigo_barras_2 = texto(celula(colunas.codigo_barras_2)).filter(|c| Some(c) != codigo_barras.as_ref());
        if codigo_barras.iter().chain(codigo_barras_2.iter()).any(|c| c.chars().count() > 50) {
            return Err(erro("código de barras com mais de 50 caracteres".to_string()));
        }

        Ok(LinhaImportacao {
            linha: numero,
            descricao,
            quantidade,
            valor_custo,
            valor_venda,
            categoria: texto(celula(colunas.categoria)).map(|c| c.chars().take(100).collect()),
            codigo_barras,
            codigo_barras_2,
        })
    })();

    Some(resultado)
}

/// Lê a primeira aba de um `.xlsx`. A primeira linha deve ser o cabeçalho.
pub fn ler_planilha(bytes: Vec<u8>) -> Result<Vec<Result<LinhaImportacao, ErroLinha>>, AppError> {
    let mut pasta: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| AppError::validacao(format!("Arquivo não é uma planilha .xlsx válida: {}", e)))?;

    let intervalo = pasta
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::validacao("Planilha sem abas."))?
        .map_err(|e| AppError::validacao(format!("Erro ao ler a planilha: {}", e)))?;

    // Número real da primeira linha do intervalo (base 1)
    let primeira_linha = intervalo.start().map(|(linha, _)| linha as usize + 1).unwrap_or(1);

    let mut linhas = intervalo.rows();
    let cabecalho = linhas.next().ok_or_else(|| AppError::validacao("Planilha vazia."))?;
    let colunas = mapear_cabecalho(cabecalho)?;

    Ok(linhas
        .enumerate()
        .filter_map(|(indice, celulas)| converter_linha(primeira_linha + indice + 1, celulas, &colunas))
        .collect())
}

fn erro_xlsx(e: XlsxError) -> AppError {
    AppError::interno(format!("Falha ao gerar planilha: {}", e))
}

/// Gera o modelo de importação com cabeçalho e uma linha de exemplo.
pub fn gerar_modelo() -> Result<Vec<u8>, AppError> {
    let mut pasta = Workbook::new();
    let negrito = Format::new().set_bold();

    let aba = pasta.add_worksheet();
    aba.set_name("Produtos").map_err(erro_xlsx)?;

    for (coluna, (titulo, largura)) in COLUNAS_MODELO.iter().enumerate() {
        let coluna = coluna as u16;
        aba.write_string_with_format(0, coluna, *titulo, &negrito).map_err(erro_xlsx)?;
        aba.set_column_width(coluna, *largura).map_err(erro_xlsx)?;
    }

    aba.write_string(1, 0, "Caneta esferográfica azul").map_err(erro_xlsx)?;
    aba.write_number(1, 1, 100.0).map_err(erro_xlsx)?;
    aba.write_number(1, 2, 0.85).map_err(erro_xlsx)?;
    aba.write_number(1, 3, 2.5).map_err(erro_xlsx)?;
    aba.write_string(1, 4, "Papelaria").map_err(erro_xlsx)?;
    aba.write_string(1, 5, "7891234567895").map_err(erro_xlsx)?;

    pasta.save_to_buffer().map_err(erro_xlsx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cabecalho(nomes: &[&str]) -> Vec<Data> {
        nomes.iter().map(|n| Data::String(n.to_string())).collect()
    }

    #[test]
    fn cabecalho_aceita_acentos_e_aliases() {
        let colunas = mapear_cabecalho(&cabecalho(&["Código de Barras", "Descrição", "Qtd", "Preço"])).unwrap();
        assert_eq!(colunas.descricao, 1);
        assert_eq!(colunas.codigo_barras, Some(0));
        assert_eq!(colunas.quantidade, Some(2));
        assert_eq!(colunas.valor_venda, Some(3));
        assert_eq!(colunas.valor_custo, None);
    }

    #[test]
    fn cabecalho_sem_descricao_e_rejeitado() {
        assert!(mapear_cabecalho(&cabecalho(&["quantidade", "preco"])).is_err());
    }

    #[test]
    fn valores_em_formato_brasileiro() {
        assert_eq!(
            decimal(&Data::String("R$ 1.234,56".into())).unwrap(),
            Some(BigDecimal::from_str("1234.56").unwrap())
        );
        assert_eq!(decimal(&Data::Float(9.9)).unwrap(), Some(BigDecimal::from_str("9.90").unwrap()));
        assert!(decimal(&Data::String("abc".into())).is_err());
    }

    #[test]
    fn codigo_numerico_perde_o_ponto_zero() {
        assert_eq!(texto(&Data::Float(7891234567895.0)).as_deref(), Some("7891234567895"));
    }

    #[test]
    fn linha_invalida_informa_numero_e_motivo() {
        let colunas = mapear_cabecalho(&cabecalho(&["descricao", "quantidade"])).unwrap();

        let curta = converter_linha(5, &[Data::String("x".into()), Data::Int(3)], &colunas).unwrap();
        assert_eq!(curta.unwrap_err().linha, 5);

        let negativa = converter_linha(6, &[Data::String("Borracha".into()), Data::Int(-1)], &colunas).unwrap();
        assert!(negativa.unwrap_err().mensagem.contains("quantidade"));

        let fracionada = converter_linha(7, &[Data::String("Borracha".into()), Data::Float(1.5)], &colunas).unwrap();
        assert!(fracionada.is_err());

        assert!(converter_linha(8, &[Data::Empty, Data::String("  ".into())], &colunas).is_none());
    }

    #[test]
    fn quantidade_em_texto_so_remove_pontos_de_milhar() {
        let quantidade = |t: &str| inteiro(&Data::String(t.into()));

        assert_eq!(quantidade("10.0"), Ok(Some(10)));
        assert_eq!(quantidade("1.000"), Ok(Some(1000)));
        assert_eq!(quantidade("12.345.678"), Ok(Some(12_345_678)));
        assert_eq!(quantidade("1,0"), Ok(Some(1)));
        assert_eq!(quantidade(" 25 "), Ok(Some(25)));
        assert!(quantidade("1.5").unwrap_err().contains("inteira"));
        assert!(quantidade("2,75").is_err());

        let colunas = mapear_cabecalho(&cabecalho(&["descricao", "quantidade"])).unwrap();
        let linha = converter_linha(3, &[Data::String("Borracha".into()), Data::String("10.0".into())], &colunas)
            .unwrap()
            .unwrap();
        assert_eq!(linha.quantidade, 10);
    }

    #[test]
    fn preco_acima_da_coluna_e_rejeitado_e_centavos_arredondados() {
        let colunas = mapear_cabecalho(&cabecalho(&["descricao", "preco"])).unwrap();

        let enorme = converter_linha(4, &[Data::String("Caneta".into()), Data::Float(1e12)], &colunas).unwrap();
        let erro = enorme.unwrap_err();
        assert_eq!(erro.linha, 4);
        assert!(erro.mensagem.contains("valor"));

        let longo = converter_linha(5, &[Data::String("Caneta".into()), Data::String("2,499".into())], &colunas)
            .unwrap()
            .unwrap();
        assert_eq!(longo.valor_venda, BigDecimal::from_str("2.50").unwrap());
    }

    #[test]
    fn campos_ausentes_assumem_zero() {
        let colunas = mapear_cabecalho(&cabecalho(&["descricao"])).unwrap();
        let linha = converter_linha(2, &[Data::String(" Régua 30cm ".into())], &colunas)
            .unwrap()
            .unwrap();
        assert_eq!(linha.descricao, "Régua 30cm");
        assert_eq!(linha.quantidade, 0);
        assert_eq!(linha.valor_venda, BigDecimal::zero());
    }

    #[test]
    fn modelo_gerado_e_aceito_pela_importacao() {
        let bytes = gerar_modelo().unwrap();
        let linhas = ler_planilha(bytes).unwrap();

        assert_eq!(linhas.len(), 1);
        let exemplo = linhas[0].as_ref().unwrap();
        assert_eq!(exemplo.linha, 2);
        assert_eq!(exemplo.quantidade, 100);
        assert_eq!(exemplo.valor_venda, BigDecimal::from_str("2.50").unwrap());
        assert_eq!(exemplo.codigo_barras.as_deref(), Some("7891234567895"));
        assert_eq!(exemplo.categoria.as_deref(), Some("Papelaria"));
    }

    #[test]
    fn arquivo_que_nao_e_planilha_e_erro_de_validacao() {
        let erro = ler_planilha(b"isto nao e um zip".to_vec()).unwrap_err();
        assert!(matches!(erro, AppError::Validacao { .. }));
    }
}
