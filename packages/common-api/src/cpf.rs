//! CPF (Cadastro de Pessoas Físicas)
//!
//! Chave usada pelo paciente para localizar suas consultas. O valor é sempre
//! guardado apenas com os 11 dígitos; pontuação é aceita na entrada.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Motivos de rejeição de um CPF
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpfError {
    #[error("CPF deve ter 11 dígitos.")]
    Length,

    #[error("CPF inválido.")]
    Checksum,
}

/// CPF validado (11 dígitos, dígitos verificadores conferidos)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cpf(String);

impl Cpf {
    /// Valida e normaliza um CPF digitado com ou sem pontuação
    pub fn parse(input: &str) -> Result<Self, CpfError> {
        let digits: Vec<u32> = input.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.len() != 11 {
            return Err(CpfError::Length);
        }

        // 000.000.000-00, 111.111.111-11, ... passam no cálculo mas não existem
        if digits.iter().all(|d| *d == digits[0]) {
            return Err(CpfError::Checksum);
        }

        if check_digit(&digits[..9]) != digits[9] || check_digit(&digits[..10]) != digits[10] {
            return Err(CpfError::Checksum);
        }

        Ok(Self(digits.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect()))
    }

    /// Apenas os 11 dígitos
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// Formato de exibição `000.000.000-00`
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11])
    }

    /// Versão para logs: só os cinco últimos dígitos ficam visíveis
    pub fn masked(&self) -> String {
        let d = &self.0;
        format!("***.***.*{}-{}", &d[7..9], &d[9..11])
    }
}

fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

/// Atalho booleano usado pelos formulários
pub fn is_valid_cpf(input: &str) -> bool {
    Cpf::parse(input).is_ok()
}

impl FromStr for Cpf {
    type Err = CpfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cpf::parse(s)
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// Debug também mascara, para o CPF não vazar em logs de estruturas inteiras
impl fmt::Debug for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cpf({})", self.masked())
    }
}

impl Serialize for Cpf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cpf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cpf::parse(&raw).map_err(serde::de::Error::custom)
    }
}
