// src/shared/logger.rs

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Inicializa o sistema de logs.
///
/// O filtro vem de `RUST_LOG` quando definido; caso contrário usa `nivel_padrao`.
/// Em produção os eventos saem em JSON, em desenvolvimento em texto legível.
/// Os registros do crate `log` (usado pelo `middleware::Logger` do actix) são
/// encaminhados ao tracing pelo próprio subscriber.
pub fn init_logger(nivel_padrao: &str, formato_json: bool) {
    let filtro = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(nivel_padrao));

    let registro = tracing_subscriber::registry().with(filtro);

    let resultado = if formato_json {
        registro
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
    } else {
        registro.with(fmt::layer().with_target(true)).try_init()
    };

    // Já inicializado (ex.: testes), ignora
    if let Err(e) = resultado {
        eprintln!("Logger já inicializado: {}", e);
    }
}
