// src/clientes/clientes_router.rs

use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::NaiveDate;
use tracing::info;
use validator::Validate;

use super::clientes_structs::{
    Cliente, ClienteResponse, DadosCliente, FiltroClientes, COLUNAS_CLIENTE, DIAS_VALIDADE_ADESAO,
};
use super::cpf::normalizar_cpf;
use crate::produtos::produtos_structs::{padrao_like, texto_opcional};
use crate::shared::datas::hoje;
use crate::shared::erro::{violacao_unicidade, AppError};
use crate::shared::shared_structs::{MensagemResponse, PaginaResponse, Paginacao};
use crate::usuarios::auth_middleware::UsuarioAutenticado;
use crate::usuarios::permissoes::Permissao;
use crate::AppState;

/// Consulta de clientes também é liberada a quem vende (para escolher o cliente).
fn exigir_consulta(usuario: &UsuarioAutenticado) -> Result<(), AppError> {
    if usuario.pode(Permissao::Vendas) {
        return Ok(());
    }
    usuario.exigir(Permissao::Clientes)
}

/// Valida e normaliza os dados recebidos (nome aparado, CPF só com dígitos).
fn preparar(dados: DadosCliente, hoje: NaiveDate) -> Result<DadosCliente, AppError> {
    dados.validate()?;

    let nome = dados.nome.trim().to_string();
    if nome.chars().count() < 2 {
        return Err(AppError::validacao("Nome deve ter pelo menos 2 caracteres."));
    }
    if dados.data_adesao.map_or(false, |data| data > hoje) {
        return Err(AppError::validacao("A data de adesão não pode estar no futuro."));
    }

    Ok(DadosCliente {
        nome,
        cpf: normalizar_cpf(&dados.cpf)?,
        telefone: texto_opcional(dados.telefone),
        data_adesao: dados.data_adesao,
    })
}

fn cpf_duplicado(e: sqlx::Error) -> AppError {
    if violacao_unicidade(&e) {
        AppError::conflito("Já existe um cliente com este CPF.")
    } else {
        AppError::from(e)
    }
}

#[get("/clientes")]
pub async fn listar_clientes(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    filtro: web::Query<FiltroClientes>,
) -> Result<HttpResponse, AppError> {
    exigir_consulta(&usuario)?;

    let paginacao = Paginacao { page: filtro.page, limit: filtro.limit };
    let (_, limite) = paginacao.normalizar();
    let busca = filtro.busca.as_deref().map(str::trim).filter(|b| !b.is_empty());
    let digitos_busca = busca
        .map(|b| b.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|d| !d.is_empty());
    let status = filtro.status.map(|s| s.as_str());
    let hoje = hoje(&data.db_pool).await?;

    // $3 = 'ativo' seleciona adesões com menos de 365 dias, 'inativo' o contrário
    let condicao = "($1::TEXT IS NULL OR c.nome ILIKE $1 OR ($2::TEXT IS NOT NULL AND c.cpf LIKE ($2 || '%'))) \
         AND ($3::TEXT IS NULL OR ($3 = 'ativo') = (c.data_adesao > $4::DATE - $5::INT))";

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM clientes c WHERE {}", condicao))
        .bind(busca.map(padrao_like))
        .bind(&digitos_busca)
        .bind(status)
        .bind(hoje)
        .bind(DIAS_VALIDADE_ADESAO as i32)
        .fetch_one(&data.db_pool)
        .await?;

    let clientes = sqlx::query_as::<_, Cliente>(&format!(
        "SELECT {} FROM clientes c WHERE {} ORDER BY c.nome LIMIT $6 OFFSET $7",
        COLUNAS_CLIENTE, condicao
    ))
    .bind(busca.map(padrao_like))
    .bind(&digitos_busca)
    .bind(status)
    .bind(hoje)
    .bind(DIAS_VALIDADE_ADESAO as i32)
    .bind(limite)
    .bind(paginacao.offset())
    .fetch_all(&data.db_pool)
    .await?;

    let clientes = clientes.into_iter().map(|c| ClienteResponse::new(c, hoje)).collect();
    Ok(HttpResponse::Ok().json(PaginaResponse::new(clientes, &paginacao, total)))
}

#[get("/clientes/{id}")]
pub async fn buscar_cliente_por_id(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    exigir_consulta(&usuario)?;
    let id = path.into_inner();

    let cliente = sqlx::query_as::<_, Cliente>(&format!("SELECT {} FROM clientes c WHERE c.id = $1", COLUNAS_CLIENTE))
        .bind(id)
        .fetch_optional(&data.db_pool)
        .await?
        .ok_or(AppError::ClienteNaoEncontrado(id))?;

    let hoje = hoje(&data.db_pool).await?;
    Ok(HttpResponse::Ok().json(ClienteResponse::new(cliente, hoje)))
}

#[post("/clientes")]
pub async fn cadastrar_cliente(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    dados: web::Json<DadosCliente>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Clientes)?;
    let hoje = hoje(&data.db_pool).await?;
    let dados = preparar(dados.into_inner(), hoje)?;

    let cliente = sqlx::query_as::<_, Cliente>(&format!(
        "INSERT INTO clientes AS c (nome, cpf, telefone, data_adesao) VALUES ($1, $2, $3, $4) RETURNING {}",
        COLUNAS_CLIENTE
    ))
    .bind(&dados.nome)
    .bind(&dados.cpf)
    .bind(&dados.telefone)
    .bind(dados.data_adesao.unwrap_or(hoje))
    .fetch_one(&data.db_pool)
    .await
    .map_err(cpf_duplicado)?;

    info!(cliente_id = cliente.id, usuario_id = usuario.id, "Cliente cadastrado");
    Ok(HttpResponse::Created().json(ClienteResponse::new(cliente, hoje)))
}

#[put("/clientes/{id}")]
pub async fn atualizar_cliente(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
    dados: web::Json<DadosCliente>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Clientes)?;
    let id = path.into_inner();
    let hoje = hoje(&data.db_pool).await?;
    let dados = preparar(dados.into_inner(), hoje)?;

    let cliente = sqlx::query_as::<_, Cliente>(&format!(
        "UPDATE clientes AS c SET nome = $1, cpf = $2, telefone = $3, \
             data_adesao = COALESCE($4, c.data_adesao), updated_at = NOW() \
         WHERE c.id = $5 RETURNING {}",
        COLUNAS_CLIENTE
    ))
    .bind(&dados.nome)
    .bind(&dados.cpf)
    .bind(&dados.telefone)
    .bind(dados.data_adesao)
    .bind(id)
    .fetch_optional(&data.db_pool)
    .await
    .map_err(cpf_duplicado)?
    .ok_or(AppError::ClienteNaoEncontrado(id))?;

    info!(cliente_id = id, usuario_id = usuario.id, "Cliente atualizado");
    Ok(HttpResponse::Ok().json(ClienteResponse::new(cliente, hoje)))
}

/// Remove um cliente sem vendas associadas.
///
/// A linha do cliente é bloqueada antes da contagem: uma venda concorrente
/// (que a bloqueia com `FOR SHARE`) espera, ou é esperada, por esta exclusão.
#[delete("/clientes/{id}")]
pub async fn deletar_cliente(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Clientes)?;
    let id = path.into_inner();

    let mut transaction = data.db_pool.begin().await?;

    sqlx::query("SELECT id FROM clientes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *transaction)
        .await?
        .ok_or(AppError::ClienteNaoEncontrado(id))?;

    let (vendas,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sales WHERE cliente_id = $1")
        .bind(id)
        .fetch_one(&mut *transaction)
        .await?;
    if vendas > 0 {
        return Err(AppError::conflito(format!(
            "Cliente possui {} venda(s) associada(s) e não pode ser excluído.",
            vendas
        )));
    }

    sqlx::query("DELETE FROM clientes WHERE id = $1")
        .bind(id)
        .execute(&mut *transaction)
        .await?;
    transaction.commit().await?;

    info!(cliente_id = id, usuario_id = usuario.id, "Cliente removido");
    Ok(HttpResponse::Ok().json(MensagemResponse::new("Cliente removido com sucesso.")))
}

/// Renova a adesão: a data de adesão passa a ser hoje.
#[post("/clientes/{id}/renovar")]
pub async fn renovar_adesao(
    data: web::Data<AppState>,
    usuario: UsuarioAutenticado,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    usuario.exigir(Permissao::Clientes)?;
    let id = path.into_inner();
    let hoje = hoje(&data.db_pool).await?;

    let cliente = sqlx::query_as::<_, Cliente>(&format!(
        "UPDATE clientes AS c SET data_adesao = $1, updated_at = NOW() WHERE c.id = $2 RETURNING {}",
        COLUNAS_CLIENTE
    ))
    .bind(hoje)
    .bind(id)
    .fetch_optional(&data.db_pool)
    .await?
    .ok_or(AppError::ClienteNaoEncontrado(id))?;

    info!(cliente_id = id, usuario_id = usuario.id, "Adesão renovada");
    Ok(HttpResponse::Ok().json(ClienteResponse::new(cliente, hoje)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dados(data_adesao: Option<NaiveDate>) -> DadosCliente {
        DadosCliente {
            nome: "  Maria Souza ".into(),
            cpf: "529.982.247-25".into(),
            telefone: Some("   ".into()),
            data_adesao,
        }
    }

    #[test]
    fn preparar_compara_adesao_com_a_data_informada() {
        let hoje = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let preparado = preparar(dados(Some(hoje)), hoje).unwrap();
        assert_eq!(preparado.nome, "Maria Souza");
        assert_eq!(preparado.cpf, "52998224725");

        let amanha = hoje.succ_opt().unwrap();
        assert!(matches!(preparar(dados(Some(amanha)), hoje), Err(AppError::Validacao { .. })));
        assert!(preparar(dados(Some(amanha)), amanha).is_ok());
    }
}
