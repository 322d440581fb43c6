//////////////////////////
// fen.rs
//////////////////////////

//! FEN encoding of positions, used for persistence and on the wire.
//!
//! Only canonical text is accepted, so `encode(decode(text)) == text` holds for
//! anything `decode` returns `Ok` for. Chess legality of the placement (king
//! count and so on) is not checked here.

use std::str::FromStr;

use thiserror::Error;

use crate::position::Position;
use crate::types::*;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),
    #[error("expected 8 ranks, found {0}")]
    RankCount(usize),
    #[error("rank {rank} covers {width} files instead of 8")]
    RankWidth { rank: u8, width: u32 },
    #[error("rank {rank} has a non-canonical empty run")]
    EmptyRun { rank: u8 },
    #[error("unknown piece character '{0}'")]
    PieceChar(char),
    #[error("side to move must be 'w' or 'b', got '{0}'")]
    SideToMove(String),
    #[error("invalid castling field '{0}'")]
    Castling(String),
    #[error("invalid en passant field '{0}'")]
    EnPassant(String),
    #[error("invalid {field} counter '{value}'")]
    Counter { field: &'static str, value: String },
}

pub fn decode(text: &str) -> Result<Position, FenError> {
    let fields: Vec<&str> = text.split(' ').collect();
    if fields.len() != 6 {
        return Err(FenError::FieldCount(fields.len()));
    }

    let mut pos = Position::empty();
    decode_placement(fields[0], &mut pos)?;

    pos.side_to_move = match fields[1] {
        "w" => Color::White,
        "b" => Color::Black,
        other => return Err(FenError::SideToMove(other.to_string())),
    };
    pos.castling_rights = decode_castling(fields[2])?;
    pos.en_passant = decode_en_passant(fields[3])?;
    pos.halfmove_clock = decode_counter("halfmove", fields[4])?;
    pos.fullmove_number = decode_counter("fullmove", fields[5])?;

    Ok(pos)
}

pub fn encode(pos: &Position) -> String {
    let mut out = String::with_capacity(90);

    for rank in (0..8u8).rev() {
        let mut empty = 0;
        for file in 0..8u8 {
            match pos.board[file as usize][rank as usize] {
                Some(piece) => {
                    if empty > 0 {
                        out.push_str(&empty.to_string());
                        empty = 0;
                    }
                    out.push(piece.symbol());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            out.push_str(&empty.to_string());
        }
        if rank > 0 {
            out.push('/');
        }
    }

    out.push(' ');
    out.push(match pos.side_to_move {
        Color::White => 'w',
        Color::Black => 'b',
    });

    out.push(' ');
    out.push_str(&encode_castling(pos.castling_rights));

    out.push(' ');
    match pos.en_passant {
        Some(sq) => out.push_str(&sq.to_string()),
        None => out.push('-'),
    }

    out.push_str(&format!(" {} {}", pos.halfmove_clock, pos.fullmove_number));
    out
}

fn decode_placement(field: &str, pos: &mut Position) -> Result<(), FenError> {
    let ranks: Vec<&str> = field.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::RankCount(ranks.len()));
    }

    for (i, rank_text) in ranks.iter().enumerate() {
        let rank = 7 - i as u8;
        let mut file: u32 = 0;
        let mut previous_was_digit = false;

        for c in rank_text.chars() {
            if let Some(run) = c.to_digit(10) {
                if run == 0 || previous_was_digit {
                    return Err(FenError::EmptyRun { rank: rank + 1 });
                }
                file += run;
                previous_was_digit = true;
            } else {
                let piece = Piece::from_symbol(c).ok_or(FenError::PieceChar(c))?;
                if file < 8 {
                    pos.board[file as usize][rank as usize] = Some(piece);
                }
                file += 1;
                previous_was_digit = false;
            }
            if file > 8 {
                return Err(FenError::RankWidth {
                    rank: rank + 1,
                    width: file,
                });
            }
        }

        if file != 8 {
            return Err(FenError::RankWidth {
                rank: rank + 1,
                width: file,
            });
        }
    }
    Ok(())
}

const CASTLING_ORDER: [(char, CastlingRights); 4] = [
    ('K', CastlingRights::WHITE_KINGSIDE),
    ('Q', CastlingRights::WHITE_QUEENSIDE),
    ('k', CastlingRights::BLACK_KINGSIDE),
    ('q', CastlingRights::BLACK_QUEENSIDE),
];

fn decode_castling(field: &str) -> Result<CastlingRights, FenError> {
    if field == "-" {
        return Ok(CastlingRights::empty());
    }
    let invalid = || FenError::Castling(field.to_string());
    if field.is_empty() {
        return Err(invalid());
    }

    // Letters must appear as an ordered subsequence of "KQkq".
    let mut rights = CastlingRights::empty();
    let mut next = 0;
    for c in field.chars() {
        let offset = CASTLING_ORDER[next..]
            .iter()
            .position(|(letter, _)| *letter == c)
            .ok_or_else(invalid)?;
        rights |= CASTLING_ORDER[next + offset].1;
        next += offset + 1;
    }
    Ok(rights)
}

fn encode_castling(rights: CastlingRights) -> String {
    let text: String = CASTLING_ORDER
        .iter()
        .filter(|(_, flag)| rights.contains(*flag))
        .map(|(letter, _)| *letter)
        .collect();
    if text.is_empty() {
        "-".to_string()
    } else {
        text
    }
}

fn decode_en_passant(field: &str) -> Result<Option<Square>, FenError> {
    if field == "-" {
        return Ok(None);
    }
    match Square::from_algebraic(field) {
        Some(sq) if sq.rank() == 2 || sq.rank() == 5 => Ok(Some(sq)),
        _ => Err(FenError::EnPassant(field.to_string())),
    }
}

fn decode_counter(field: &'static str, value: &str) -> Result<u32, FenError> {
    let invalid = || FenError::Counter {
        field,
        value: value.to_string(),
    };
    let canonical = !value.is_empty()
        && value.chars().all(|c| c.is_ascii_digit())
        && (value == "0" || !value.starts_with('0'));
    if !canonical {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

impl Position {
    pub fn from_fen(text: &str) -> Result<Position, FenError> {
        decode(text)
    }

    pub fn to_fen(&self) -> String {
        encode(self)
    }
}

impl FromStr for Position {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}
