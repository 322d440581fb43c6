//////////////////////////
// uci.rs
//////////////////////////

//! Compact coordinate move notation: `e2e4`, `e7e8q`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveParseError {
    #[error("move text must be 4 or 5 characters, got {0}")]
    Length(usize),
    #[error("'{0}' is not a square")]
    Square(String),
    #[error("'{0}' is not a promotion piece (expected n, b, r or q)")]
    Promotion(char),
}

pub fn parse(text: &str) -> Result<Move, MoveParseError> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() != 4 && chars.len() != 5 {
        return Err(MoveParseError::Length(chars.len()));
    }

    let square = |f: char, r: char| {
        Square::from_chars(f, r).ok_or_else(|| MoveParseError::Square(format!("{}{}", f, r)))
    };
    let from = square(chars[0], chars[1])?;
    let to = square(chars[2], chars[3])?;

    let promotion = match chars.get(4) {
        None => None,
        Some(&c) => match c {
            'n' => Some(PieceType::Knight),
            'b' => Some(PieceType::Bishop),
            'r' => Some(PieceType::Rook),
            'q' => Some(PieceType::Queen),
            other => return Err(MoveParseError::Promotion(other)),
        },
    };

    Ok(Move {
        from,
        to,
        promotion,
    })
}

pub fn render(mv: &Move) -> String {
    mv.to_string()
}

impl Move {
    pub fn from_uci(text: &str) -> Result<Move, MoveParseError> {
        parse(text)
    }
}

impl FromStr for Move {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(pt) = self.promotion {
            write!(f, "{}", pt.to_char())?;
        }
        Ok(())
    }
}
