//! The fixed set of tradeable cookie ingredients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Ingredient codes accepted by the ledger. The set is closed; anything
/// else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ingredient {
    Crl,
    Chc,
    Btr,
    Suc,
    Noi,
    Sel,
    Vnl,
    Oeuf,
}

impl Ingredient {
    pub const ALL: [Ingredient; 8] = [
        Ingredient::Crl,
        Ingredient::Chc,
        Ingredient::Btr,
        Ingredient::Suc,
        Ingredient::Noi,
        Ingredient::Sel,
        Ingredient::Vnl,
        Ingredient::Oeuf,
    ];

    /// Short code as stored in the database.
    pub fn code(&self) -> &'static str {
        match self {
            Ingredient::Crl => "CRL",
            Ingredient::Chc => "CHC",
            Ingredient::Btr => "BTR",
            Ingredient::Suc => "SUC",
            Ingredient::Noi => "NOI",
            Ingredient::Sel => "SEL",
            Ingredient::Vnl => "VNL",
            Ingredient::Oeuf => "OEUF",
        }
    }

    /// Human-readable name for display.
    pub fn name(&self) -> &'static str {
        match self {
            Ingredient::Crl => "Cereal",
            Ingredient::Chc => "Chocolate",
            Ingredient::Btr => "Butter",
            Ingredient::Suc => "Sugar",
            Ingredient::Noi => "Walnut",
            Ingredient::Sel => "Salt",
            Ingredient::Vnl => "Vanilla",
            Ingredient::Oeuf => "Eggs",
        }
    }
}

impl FromStr for Ingredient {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CRL" => Ok(Ingredient::Crl),
            "CHC" => Ok(Ingredient::Chc),
            "BTR" => Ok(Ingredient::Btr),
            "SUC" => Ok(Ingredient::Suc),
            "NOI" => Ok(Ingredient::Noi),
            "SEL" => Ok(Ingredient::Sel),
            "VNL" => Ok(Ingredient::Vnl),
            "OEUF" => Ok(Ingredient::Oeuf),
            other => Err(LedgerError::InvalidIngredient(other.to_string())),
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
