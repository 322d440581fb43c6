//////////////////////////
// position.rs
//////////////////////////

use std::fmt;

use crate::types::*;

/// A chess position plus everything needed to continue play from it.
///
/// Positions are values: the rules engine never mutates one in place, it
/// produces successors (see `Position::apply`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    pub(crate) board: Board,
    pub(crate) side_to_move: Color,
    pub(crate) castling_rights: CastlingRights,
    pub(crate) en_passant: Option<Square>,
    pub(crate) halfmove_clock: u32,
    pub(crate) fullmove_number: u32,
}

impl Default for Position {
    fn default() -> Self {
        Position::starting()
    }
}

impl Position {
    /// The standard initial array, White to move.
    pub fn starting() -> Self {
        let mut board: Board = [[None; 8]; 8];
        let back_row = [
            PieceType::Rook,
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Queen,
            PieceType::King,
            PieceType::Bishop,
            PieceType::Knight,
            PieceType::Rook,
        ];
        for (file, pt) in back_row.iter().enumerate() {
            board[file][0] = Some(Piece::new(*pt, Color::White));
            board[file][1] = Some(Piece::new(PieceType::Pawn, Color::White));
            board[file][6] = Some(Piece::new(PieceType::Pawn, Color::Black));
            board[file][7] = Some(Piece::new(*pt, Color::Black));
        }

        Position {
            board,
            side_to_move: Color::White,
            castling_rights: CastlingRights::all(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// An empty board with no rights; used by the codec as a blank to fill.
    pub(crate) fn empty() -> Self {
        Position {
            board: [[None; 8]; 8],
            side_to_move: Color::White,
            castling_rights: CastlingRights::empty(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn castling_rights(&self) -> CastlingRights {
        self.castling_rights
    }

    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.board[sq.file() as usize][sq.rank() as usize]
    }

    pub(crate) fn set_piece(&mut self, sq: Square, piece: Option<Piece>) {
        self.board[sq.file() as usize][sq.rank() as usize] = piece;
    }

    /// Every occupied square with its piece, a1 first.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |sq| self.piece_at(sq).map(|p| (sq, p)))
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces()
            .find(|(_, p)| p.piece_type == PieceType::King && p.color == color)
            .map(|(sq, _)| sq)
    }

    /// Eight text rows, rank 8 first, pieces as FEN letters and `.` for empty squares.
    pub fn ascii_rows(&self) -> Vec<String> {
        (0..8u8)
            .rev()
            .map(|rank| {
                (0..8u8)
                    .map(|file| {
                        self.board[file as usize][rank as usize]
                            .map(|p| p.symbol())
                            .unwrap_or('.')
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n  a b c d e f g h")?;
        writeln!(f, "  ---------------")?;
        for rank in (0..8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8 {
                let glyph = match &self.board[file][rank] {
                    Some(p) => p.glyph(),
                    None => "·",
                };
                write!(f, "{} ", glyph)?;
            }
            writeln!(f, "{}", rank + 1)?;
        }
        writeln!(f, "  ---------------")?;
        writeln!(f, "  a b c d e f g h")?;
        write!(f, "\nTurn: {}", self.side_to_move)
    }
}
