// src/clientes/cpf.rs

use crate::shared::erro::AppError;

/// Dígito verificador do CPF para os `digitos` informados (9 ou 10).
pub fn digito_verificador(digitos: &[u32]) -> u32 {
    let peso_inicial = digitos.len() as u32 + 1;
    let soma: u32 = digitos
        .iter()
        .enumerate()
        .map(|(i, d)| d * (peso_inicial - i as u32))
        .sum();
    match (soma * 10) % 11 {
        10 => 0,
        resto => resto,
    }
}

/// Valida um CPF (com ou sem pontuação) e devolve só os 11 dígitos.
pub fn normalizar_cpf(entrada: &str) -> Result<String, AppError> {
    let digitos: Vec<u32> = entrada.chars().filter_map(|c| c.to_digit(10)).collect();
    let so_pontuacao = entrada.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ' '));

    if digitos.len() != 11 || !so_pontuacao {
        return Err(AppError::validacao("CPF deve conter 11 dígitos."));
    }
    // 000.000.000-00, 111.111.111-11... passam no cálculo mas não são válidos
    if digitos.iter().all(|d| *d == digitos[0]) {
        return Err(AppError::validacao("CPF inválido."));
    }
    if digito_verificador(&digitos[..9]) != digitos[9] || digito_verificador(&digitos[..10]) != digitos[10] {
        return Err(AppError::validacao("CPF inválido."));
    }

    Ok(digitos.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect())
}
