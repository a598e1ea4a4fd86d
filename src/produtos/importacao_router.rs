// src/produtos/importacao_router.rs

use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{get, post, web, HttpResponse};
use futures::TryStreamExt;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};

use super::importacao::{reconciliar, IndiceProdutos, PlanoLote, ResultadoImportacao};
use super::planilha::{gerar_modelo, ler_planilha};
use crate::shared::erro::AppError;
use crate::usuarios::auth_middleware::UsuarioAutenticado;
use crate::usuarios::permissoes::Permissao;
use crate::AppState;

/// Tamanho máximo da planilha (100MB).
const TAMANHO_MAXIMO_PLANILHA: usize = 100 * 1024 * 1024;
const LOTE_MAXIMO: usize = 1000;
const TIPO_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Recebe o primeiro arquivo `.xlsx` do formulário.
async fn receber_planilha(payload: &mut Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(mut campo) = payload.try_next().await? {
        let Some(nome) = campo.content_disposition().get_filename().map(str::to_lowercase) else {
            continue;
        };
        if !nome.ends_with(".xlsx") {
            return Err(AppError::validacao("Envie uma planilha no formato .xlsx."));
        }

        let mut bytes = Vec::new();
        while let Some(pedaco) = campo.try_next().await? {
            if bytes.len() + pedaco.len() > TAMANHO_MAXIMO_PLANILHA {
                return Err(AppError::validacao("Planilha excede o limite de 100MB."));
            }
            bytes.extend_from_slice(&pedaco);
        }
        if bytes.is_empty() {
            return Err(AppError::validacao("Arquivo vazio."));
        }
        return Ok(bytes);
    }

    Err(AppError::validacao("Nenhum arquivo enviado."))
}

/// (id, descrição, quantidade, código 1, código 2)
type ProdutoIndexado = (i32, String, i32, Option<String>, Option<String>);

const COLUNAS_INDICE: &str = "id, descricao, quantidade, codigo_barras, codigo_barras_2";

fn indexar(indice: &mut IndiceProdutos, produtos: &[ProdutoIndexado]) {
    for (id, descricao, quantidade, codigo, codigo_2) in produtos {
        indice.registrar(*id, descricao, *quantidade, codigo.as_deref().into_iter().chain(codigo_2.as_deref()));
    }
}

async fn carregar_indice(pool: &PgPool) -> Result<IndiceProdutos, sqlx::Error> {
    let produtos: Vec<ProdutoIndexado> =
        sqlx::query_as(&format!("SELECT {} FROM products ORDER BY id", COLUNAS_INDICE))
            .fetch_all(pool)
            .await?;

    let mut indice = IndiceProdutos::default();
    indexar(&mut indice, &produtos);
    Ok(indice)
}

/// Grava um lote numa única transação e devolve os produtos criados.
async fn aplicar_lote(pool: &PgPool, plano: &PlanoLote) -> Result<Vec<ProdutoIndexado>, sqlx::Error> {
    let mut transaction = pool.begin().await?;

    if !plano.atualizacoes.is_empty() {
        let (ids, deltas): (Vec<i32>, Vec<i64>) = plano.atualizacoes.iter().copied().unzip();
        sqlx::query(
            "UPDATE products AS p SET quantidade = p.quantidade + d.delta, updated_at = NOW() \
             FROM UNNEST($1::INT[], $2::BIGINT[]) AS d(id, delta) \
             WHERE p.id = d.id",
        )
        .bind(&ids)
        .bind(&deltas)
        .execute(&mut *transaction)
        .await?;
    }

    let mut criados = Vec::new();
    if !plano.insercoes.is_empty() {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO products (descricao, quantidade, valor_custo, valor_venda, categoria, codigo_barras, codigo_barras_2) ",
        );
        query.push_values(&plano.insercoes, |mut linha, produto| {
            linha
                .push_bind(&produto.descricao)
                .push_bind(produto.quantidade)
                .push_bind(&produto.valor_custo)
                .push_bind(&produto.valor_venda)
                .push_bind(&produto.categoria)
                .push_bind(&produto.codigo_barras)
                .push_bind(&produto.codigo_barras_2);
        });
        query.push(" RETURNING ").push(COLUNAS_INDICE);

        criados = query.build_query_as().fetch_all(&mut *transaction).await?;
    }

    transaction.commit().await?;
    Ok(criados)
}

/// Importação em lote de produtos a partir de uma planilha `.xlsx`.
///
/// Cada lote é gravado na sua própria transação: um lote com erro é desfeito
/// e contado em `falhas`, sem afetar os lotes já gravados.
#[post("/products/import")]
pub async fn importar_produtos(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Produtos)?;

    let bytes = receber_planilha(&mut payload).await?;
    let linhas = web::block(move || ler_planilha(bytes)).await??;
    if linhas.is_empty() {
        return Err(AppError::validacao("A planilha não possui linhas de dados."));
    }

    let mut indice = carregar_indice(&data.db_pool).await?;
    let tamanho_lote = data.config.import_batch_size.clamp(1, LOTE_MAXIMO);
    let mut resultado = ResultadoImportacao::new(linhas.len());

    info!(
        usuario_id = usuario.id,
        linhas = linhas.len(),
        produtos_existentes = indice.len(),
        tamanho_lote,
        "Importação de produtos iniciada"
    );

    let mut restantes = linhas.into_iter().peekable();
    let mut numero_lote = 0;
    while restantes.peek().is_some() {
        numero_lote += 1;
        let lote: Vec<_> = restantes.by_ref().take(tamanho_lote).collect();
        let plano = reconciliar(&indice, lote);

        if plano.linhas_aceitas() == 0 {
            resultado.lote_gravado(&plano);
            continue;
        }

        match aplicar_lote(&data.db_pool, &plano).await {
            Ok(criados) => {
                indexar(&mut indice, &criados);
                for (id, delta) in &plano.atualizacoes {
                    indice.somar(*id, *delta);
                }
                resultado.lote_gravado(&plano);
            }
            Err(e) => {
                warn!(lote = numero_lote, erro = %e, "Lote de importação desfeito");
                resultado.lote_falhou(numero_lote, &plano, "erro ao gravar no banco de dados");
            }
        }
    }

    info!(
        usuario_id = usuario.id,
        criados = resultado.criados,
        atualizados = resultado.atualizados,
        falhas = resultado.falhas,
        lotes_com_falha = resultado.lotes_com_falha,
        "Importação de produtos concluída"
    );
    Ok(HttpResponse::Ok().json(resultado))
}

/// Download do modelo de planilha para importação.
#[get("/products/template")]
pub async fn baixar_modelo(_usuario: UsuarioAutenticado) -> Result<HttpResponse, AppError> {
    let bytes = web::block(gerar_modelo).await??;

    Ok(HttpResponse::Ok()
        .content_type(TIPO_XLSX)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename("modelo_importacao_produtos.xlsx".to_string())],
        })
        .body(bytes))
}
