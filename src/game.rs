//////////////////////////
// game.rs
//////////////////////////

//! Rules engine: move generation, legality, move application and terminal
//! detection, all as methods on `Position`.

use crate::position::Position;
use crate::types::*;

const KNIGHT_JUMPS: [(i8, i8); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];

const KING_STEPS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
const ROOK_DIRECTIONS: [(i8, i8); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Halfmove clock value at which the game is drawn without a claim.
pub const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

impl Position {
    /// Geometrically valid moves for the side to move, ignoring self-check.
    pub fn pseudo_moves(&self) -> Vec<Move> {
        let us = self.side_to_move;
        let mut moves = Vec::with_capacity(64);

        for (from, piece) in self.pieces() {
            if piece.color != us {
                continue;
            }
            match piece.piece_type {
                PieceType::Pawn => self.generate_pawn_moves(from, us, &mut moves),
                PieceType::Knight => self.generate_steps(from, us, &KNIGHT_JUMPS, &mut moves),
                PieceType::Bishop => {
                    self.generate_slides(from, us, &BISHOP_DIRECTIONS, &mut moves)
                }
                PieceType::Rook => self.generate_slides(from, us, &ROOK_DIRECTIONS, &mut moves),
                PieceType::Queen => {
                    self.generate_slides(from, us, &BISHOP_DIRECTIONS, &mut moves);
                    self.generate_slides(from, us, &ROOK_DIRECTIONS, &mut moves);
                }
                PieceType::King => {
                    self.generate_steps(from, us, &KING_STEPS, &mut moves);
                    self.generate_castling(from, us, &mut moves);
                }
            }
        }
        moves
    }

    /// Pseudo moves that do not leave the mover's king attacked.
    pub fn legal_moves(&self) -> Vec<Move> {
        self.pseudo_moves()
            .into_iter()
            .filter(|mv| self.leaves_king_safe(mv))
            .collect()
    }

    pub fn is_legal(&self, mv: &Move) -> bool {
        self.pseudo_moves().contains(mv) && self.leaves_king_safe(mv)
    }

    /// Successor position for a move already known to be legal.
    ///
    /// The en passant target is only kept when the opponent can actually
    /// capture onto it, so equal positions always encode to equal text.
    pub fn apply(&self, mv: &Move) -> Position {
        let mut next = self.make_move_without_validation(mv);
        if let Some(target) = next.en_passant {
            if !next.has_legal_en_passant(target) {
                next.en_passant = None;
            }
        }
        next
    }

    /// Checked variant of `apply`.
    pub fn play(&self, mv: &Move) -> Result<Position, MoveError> {
        if self.is_legal(mv) {
            Ok(self.apply(mv))
        } else {
            Err(MoveError::Illegal(*mv))
        }
    }

    /// True if any piece of `by` attacks `target`. Does not modify the board.
    pub fn is_square_attacked(&self, target: Square, by: Color) -> bool {
        let holds = |sq: Square, kinds: &[PieceType]| {
            matches!(self.piece_at(sq), Some(p) if p.color == by && kinds.contains(&p.piece_type))
        };

        // An attacking pawn stands one rank behind the target from its own point of view.
        let behind = -by.pawn_direction();
        for df in [-1, 1] {
            if let Some(sq) = target.offset(df, behind) {
                if holds(sq, &[PieceType::Pawn]) {
                    return true;
                }
            }
        }

        let leapers = [
            (&KNIGHT_JUMPS, PieceType::Knight),
            (&KING_STEPS, PieceType::King),
        ];
        for (deltas, kind) in leapers {
            for &(df, dr) in deltas.iter() {
                if let Some(sq) = target.offset(df, dr) {
                    if holds(sq, &[kind]) {
                        return true;
                    }
                }
            }
        }

        let sliders = [
            (&BISHOP_DIRECTIONS, PieceType::Bishop),
            (&ROOK_DIRECTIONS, PieceType::Rook),
        ];
        for (directions, kind) in sliders {
            for &(df, dr) in directions.iter() {
                let mut current = target;
                while let Some(sq) = current.offset(df, dr) {
                    if self.piece_at(sq).is_some() {
                        if holds(sq, &[kind, PieceType::Queen]) {
                            return true;
                        }
                        break;
                    }
                    current = sq;
                }
            }
        }

        false
    }

    pub fn is_in_check(&self, color: Color) -> bool {
        match self.king_square(color) {
            Some(king) => self.is_square_attacked(king, color.opposite()),
            None => false,
        }
    }

    /// The side to move's king is attacked.
    pub fn is_check(&self) -> bool {
        self.is_in_check(self.side_to_move)
    }

    pub fn is_checkmate(&self) -> bool {
        self.is_check() && self.legal_moves().is_empty()
    }

    pub fn is_stalemate(&self) -> bool {
        !self.is_check() && self.legal_moves().is_empty()
    }

    /// Neither side has enough material left to deliver mate.
    pub fn is_insufficient_material(&self) -> bool {
        Color::ALL
            .iter()
            .all(|&color| self.has_insufficient_material(color))
    }

    pub fn has_insufficient_material(&self, color: Color) -> bool {
        let ours: Vec<PieceType> = self
            .pieces()
            .filter(|(_, p)| p.color == color && p.piece_type != PieceType::King)
            .map(|(_, p)| p.piece_type)
            .collect();

        if ours
            .iter()
            .any(|pt| matches!(pt, PieceType::Pawn | PieceType::Rook | PieceType::Queen))
        {
            return false;
        }

        if ours.contains(&PieceType::Knight) {
            // A lone knight can still mate if the opponent has blockers to mate against.
            let opponent_blockers = self.pieces().any(|(_, p)| {
                p.color != color && !matches!(p.piece_type, PieceType::King | PieceType::Queen)
            });
            return ours.len() <= 1 && !opponent_blockers;
        }

        if ours.contains(&PieceType::Bishop) {
            let mut bishops = self
                .pieces()
                .filter(|(_, p)| p.piece_type == PieceType::Bishop)
                .map(|(sq, _)| sq.is_light());
            let first = bishops.next();
            let same_color = bishops.all(|light| Some(light) == first);
            let no_pawns_or_knights = !self
                .pieces()
                .any(|(_, p)| matches!(p.piece_type, PieceType::Pawn | PieceType::Knight));
            return same_color && no_pawns_or_knights;
        }

        true
    }

    /// Seventy-five moves by each side without a capture or pawn move.
    pub fn is_seventyfive_moves(&self) -> bool {
        self.halfmove_clock >= SEVENTY_FIVE_MOVE_PLIES && !self.legal_moves().is_empty()
    }

    /// Terminal result of the position, if the game is over.
    pub fn outcome(&self) -> Option<Outcome> {
        if self.legal_moves().is_empty() {
            return Some(if self.is_check() {
                Outcome::Win(self.side_to_move.opposite())
            } else {
                Outcome::Draw
            });
        }
        if self.is_insufficient_material() || self.halfmove_clock >= SEVENTY_FIVE_MOVE_PLIES {
            return Some(Outcome::Draw);
        }
        None
    }

    /// Number of leaf positions `depth` plies below this one.
    pub fn perft(&self, depth: u32) -> u64 {
        if depth == 0 {
            return 1;
        }
        let moves = self.legal_moves();
        if depth == 1 {
            return moves.len() as u64;
        }
        moves.iter().map(|mv| self.apply(mv).perft(depth - 1)).sum()
    }

    fn generate_pawn_moves(&self, from: Square, us: Color, moves: &mut Vec<Move>) {
        let direction = us.pawn_direction();
        let (start_rank, last_rank, en_passant_rank) = match us {
            Color::White => (1, 7, 5),
            Color::Black => (6, 0, 2),
        };

        // Pushes
        if let Some(one) = from.offset(0, direction) {
            if self.piece_at(one).is_none() {
                push_pawn_move(from, one, last_rank, moves);
                if from.rank() == start_rank {
                    if let Some(two) = from.offset(0, 2 * direction) {
                        if self.piece_at(two).is_none() {
                            moves.push(Move::new(from, two));
                        }
                    }
                }
            }
        }

        // Captures, including en passant
        for df in [-1, 1] {
            let Some(target) = from.offset(df, direction) else {
                continue;
            };
            match self.piece_at(target) {
                Some(p) if p.color != us => push_pawn_move(from, target, last_rank, moves),
                None if self.en_passant == Some(target) && target.rank() == en_passant_rank => {
                    let victim = Square::at(target.file(), from.rank());
                    if self.piece_at(victim) == Some(Piece::new(PieceType::Pawn, us.opposite())) {
                        moves.push(Move::new(from, target));
                    }
                }
                _ => {}
            }
        }
    }

    fn generate_steps(&self, from: Square, us: Color, deltas: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(df, dr) in deltas {
            if let Some(to) = from.offset(df, dr) {
                if self.piece_at(to).map_or(true, |p| p.color != us) {
                    moves.push(Move::new(from, to));
                }
            }
        }
    }

    fn generate_slides(
        &self,
        from: Square,
        us: Color,
        directions: &[(i8, i8)],
        moves: &mut Vec<Move>,
    ) {
        for &(df, dr) in directions {
            let mut current = from;
            while let Some(to) = current.offset(df, dr) {
                match self.piece_at(to) {
                    None => moves.push(Move::new(from, to)),
                    Some(p) => {
                        if p.color != us {
                            moves.push(Move::new(from, to));
                        }
                        break;
                    }
                }
                current = to;
            }
        }
    }

    fn generate_castling(&self, from: Square, us: Color, moves: &mut Vec<Move>) {
        let rank = us.back_rank();
        if from != Square::at(4, rank) {
            return;
        }
        let rook = Some(Piece::new(PieceType::Rook, us));
        let is_path_clear = |files: std::ops::RangeInclusive<u8>| {
            files
                .into_iter()
                .all(|file| self.piece_at(Square::at(file, rank)).is_none())
        };

        if self.castling_rights.contains(CastlingRights::kingside(us))
            && self.piece_at(Square::at(7, rank)) == rook
            && is_path_clear(5..=6)
        {
            moves.push(Move::new(from, Square::at(6, rank)));
        }
        if self.castling_rights.contains(CastlingRights::queenside(us))
            && self.piece_at(Square::at(0, rank)) == rook
            && is_path_clear(1..=3)
        {
            moves.push(Move::new(from, Square::at(2, rank)));
        }
    }

    fn is_castling(&self, mv: &Move) -> bool {
        matches!(self.piece_at(mv.from), Some(p) if p.piece_type == PieceType::King)
            && mv.from.file().abs_diff(mv.to.file()) == 2
    }

    fn leaves_king_safe(&self, mv: &Move) -> bool {
        let us = self.side_to_move;
        let them = us.opposite();

        if self.is_castling(mv) {
            let transit = Square::at((mv.from.file() + mv.to.file()) / 2, mv.from.rank());
            if self.is_in_check(us) || self.is_square_attacked(transit, them) {
                return false;
            }
        }

        let next = self.make_move_without_validation(mv);
        !next.is_in_check(us)
    }

    fn has_legal_en_passant(&self, target: Square) -> bool {
        let us = self.side_to_move;
        let pawn = Some(Piece::new(PieceType::Pawn, us));
        [-1, 1].into_iter().any(|df| match target.offset(df, -us.pawn_direction()) {
            Some(from) if self.piece_at(from) == pawn => {
                self.leaves_king_safe(&Move::new(from, target))
            }
            _ => false,
        })
    }

    /// Placement-level successor: no legality checks, no en passant pruning.
    fn make_move_without_validation(&self, mv: &Move) -> Position {
        let mut next = self.clone();
        let Some(piece) = self.piece_at(mv.from) else {
            return next;
        };
        let us = self.side_to_move;
        let captured = self.piece_at(mv.to);
        let is_pawn = piece.piece_type == PieceType::Pawn;

        next.set_piece(mv.from, None);
        let placed = match mv.promotion {
            Some(pt) => Piece::new(pt, piece.color),
            None => piece,
        };
        next.set_piece(mv.to, Some(placed));

        // En passant removes the pawn beside the origin, not on the target.
        if is_pawn && mv.from.file() != mv.to.file() && captured.is_none() {
            next.set_piece(Square::at(mv.to.file(), mv.from.rank()), None);
        }

        if self.is_castling(mv) {
            let rank = mv.from.rank();
            let (rook_from, rook_to) = if mv.to.file() == 6 { (7, 5) } else { (0, 3) };
            let rook = next.piece_at(Square::at(rook_from, rank));
            next.set_piece(Square::at(rook_from, rank), None);
            next.set_piece(Square::at(rook_to, rank), rook);
        }

        next.castling_rights
            .remove(CastlingRights::touched_by(mv.from) | CastlingRights::touched_by(mv.to));

        next.en_passant = None;
        if is_pawn && mv.from.rank().abs_diff(mv.to.rank()) == 2 {
            next.en_passant = Some(Square::at(
                mv.from.file(),
                (mv.from.rank() + mv.to.rank()) / 2,
            ));
        }

        if is_pawn || captured.is_some() {
            next.halfmove_clock = 0;
        } else {
            next.halfmove_clock = next.halfmove_clock.saturating_add(1);
        }
        if us == Color::Black {
            next.fullmove_number = next.fullmove_number.saturating_add(1);
        }
        next.side_to_move = us.opposite();
        next
    }
}

fn push_pawn_move(from: Square, to: Square, last_rank: u8, moves: &mut Vec<Move>) {
    if to.rank() == last_rank {
        for pt in PieceType::PROMOTIONS {
            moves.push(Move::with_promotion(from, to, pt));
        }
    } else {
        moves.push(Move::new(from, to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(fen: &str) -> Position {
        Position::from_fen(fen).unwrap()
    }

    fn mv(text: &str) -> Move {
        Move::from_uci(text).unwrap()
    }

    fn play_line(start: Position, line: &[&str]) -> Position {
        line.iter().fold(start, |p, text| {
            p.play(&mv(text))
                .unwrap_or_else(|e| panic!("{} rejected: {}", text, e))
        })
    }

    #[test]
    fn perft_starting_position() {
        let start = Position::starting();
        assert_eq!(start.perft(1), 20);
        assert_eq!(start.perft(2), 400);
        assert_eq!(start.perft(3), 8902);
    }

    #[test]
    fn perft_kiwipete() {
        let p = pos("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        assert_eq!(p.perft(1), 48);
        assert_eq!(p.perft(2), 2039);
    }

    #[test]
    fn perft_en_passant_pins() {
        let p = pos("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1");
        assert_eq!(p.perft(1), 14);
        assert_eq!(p.perft(2), 191);
        assert_eq!(p.perft(3), 2812);
    }

    #[test]
    fn fools_mate() {
        let p = play_line(Position::starting(), &["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert!(p.is_check());
        assert!(p.is_checkmate());
        assert!(!p.is_stalemate());
        assert_eq!(p.outcome(), Some(Outcome::Win(Color::Black)));
    }

    #[test]
    fn scholars_mate() {
        let p = play_line(
            Position::starting(),
            &["e2e4", "e7e5", "d1h5", "b8c6", "f1c4", "g8f6", "h5f7"],
        );
        assert!(p.is_check());
        assert!(p.is_checkmate());
        assert_eq!(p.outcome(), Some(Outcome::Win(Color::White)));
    }

    #[test]
    fn rejects_non_adjacent_pawn_push() {
        let start = Position::starting();
        assert!(!start.is_legal(&mv("e2e5")));
        assert_eq!(start.play(&mv("e2e5")), Err(MoveError::Illegal(mv("e2e5"))));
    }

    #[test]
    fn pinned_piece_cannot_move() {
        let p = pos("4k3/4r3/8/8/8/8/4B3/4K3 w - - 0 1");
        assert!(p.pseudo_moves().contains(&mv("e2d3")));
        assert!(!p.is_legal(&mv("e2d3")));
        assert!(p.legal_moves().iter().all(|m| m.from != mv("e2d3").from));
    }

    #[test]
    fn king_cannot_step_into_check() {
        let p = pos("4k3/8/8/8/8/8/3r4/4K3 w - - 0 1");
        assert!(!p.is_legal(&mv("e1e2")));
        assert!(p.is_legal(&mv("e1d2")));
        assert!(!p.is_legal(&mv("e1d1")));
    }

    #[test]
    fn castling_moves_rook_and_clears_rights() {
        let p = pos("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        let next = p.play(&mv("e1g1")).unwrap();
        assert_eq!(next.to_fen(), "r3k2r/8/8/8/8/8/8/R4RK1 b kq - 1 1");
        let next = next.play(&mv("e8c8")).unwrap();
        assert_eq!(next.to_fen(), "2kr3r/8/8/8/8/8/8/R4RK1 w - - 2 2");
    }

    #[test]
    fn castling_forbidden_through_or_out_of_check() {
        let through = pos("r3k2r/8/8/8/8/8/5r2/R3K2R w KQkq - 0 1");
        assert!(!through.is_legal(&mv("e1g1")));
        assert!(through.is_legal(&mv("e1c1")));

        let out_of = pos("r3k2r/8/8/8/8/8/4r3/R3K2R w KQkq - 0 1");
        assert!(!out_of.is_legal(&mv("e1g1")));
        assert!(!out_of.is_legal(&mv("e1c1")));
    }

    #[test]
    fn castling_requires_rights_and_empty_path() {
        let no_rights = pos("r3k2r/8/8/8/8/8/8/R3K2R w kq - 0 1");
        assert!(!no_rights.is_legal(&mv("e1g1")));

        let blocked = pos("r3k2r/8/8/8/8/8/8/RN2K1NR w KQkq - 0 1");
        assert!(!blocked.is_legal(&mv("e1g1")));
        assert!(!blocked.is_legal(&mv("e1c1")));
    }

    #[test]
    fn capturing_a_rook_clears_its_right() {
        let p = pos("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        let next = p.play(&mv("a1a8")).unwrap();
        assert_eq!(next.to_fen(), "R3k2r/8/8/8/8/8/8/4K2R b Kk - 0 1");
        assert!(next.is_check());
    }

    #[test]
    fn en_passant_capture_removes_pawn() {
        let p = pos("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2");
        let next = p.play(&mv("e5d6")).unwrap();
        assert_eq!(next.to_fen(), "4k3/8/3P4/8/8/8/8/4K3 b - - 0 2");
    }

    #[test]
    fn en_passant_target_only_kept_when_capturable() {
        let quiet = Position::starting().play(&mv("e2e4")).unwrap();
        assert_eq!(quiet.en_passant(), None);

        let p = pos("4k3/8/8/8/3p4/8/4P3/4K3 w - - 0 1");
        let next = p.play(&mv("e2e4")).unwrap();
        assert_eq!(next.en_passant(), Square::from_algebraic("e3"));
        assert!(next.is_legal(&mv("d4e3")));

        let later = next.play(&mv("e8d8")).unwrap();
        assert_eq!(later.en_passant(), None);
    }

    #[test]
    fn promotion_letter_is_required_and_checked() {
        let p = pos("8/P7/8/8/8/8/8/k6K w - - 0 1");
        assert!(!p.is_legal(&mv("a7a8")));
        for text in ["a7a8q", "a7a8r", "a7a8b", "a7a8n"] {
            assert!(p.is_legal(&mv(text)), "{} should be legal", text);
        }
        let next = p.play(&mv("a7a8n")).unwrap();
        assert_eq!(
            next.piece_at(Square::A8),
            Some(Piece::new(PieceType::Knight, Color::White))
        );
        assert!(!Position::starting().is_legal(&mv("e2e4q")));
    }

    #[test]
    fn counters_advance() {
        let p = play_line(Position::starting(), &["g1f3", "g8f6"]);
        assert_eq!(p.halfmove_clock(), 2);
        assert_eq!(p.fullmove_number(), 2);
        let p = p.play(&mv("e2e4")).unwrap();
        assert_eq!(p.halfmove_clock(), 0);
        assert_eq!(p.fullmove_number(), 2);
        assert_eq!(p.side_to_move(), Color::Black);
    }

    #[test]
    fn stalemate_is_a_draw() {
        let p = pos("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert!(p.is_stalemate());
        assert!(!p.is_checkmate());
        assert_eq!(p.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn insufficient_material() {
        assert!(pos("8/8/8/4k3/8/8/8/4K3 w - - 0 1").is_insufficient_material());
        assert!(pos("8/8/8/4k3/8/8/8/2B1K3 w - - 0 1").is_insufficient_material());
        assert!(pos("8/8/8/4k3/8/8/8/1N2K3 w - - 0 1").is_insufficient_material());
        assert!(!pos("8/8/8/4k3/8/8/8/1NN1K3 w - - 0 1").is_insufficient_material());
        assert!(!pos("8/8/8/4k3/8/8/8/R3K3 w - - 0 1").is_insufficient_material());
        // Same-coloured bishops (c1 and f4 are both dark)
        assert!(pos("8/8/8/4k3/5b2/8/8/2B1K3 w - - 0 1").is_insufficient_material());
        // Opposite-coloured bishops
        assert!(!pos("8/8/8/4k3/4b3/8/8/2B1K3 w - - 0 1").is_insufficient_material());
        assert_eq!(
            pos("8/8/8/4k3/8/8/8/4K3 w - - 0 1").outcome(),
            Some(Outcome::Draw)
        );
    }

    #[test]
    fn seventy_five_move_rule() {
        assert_eq!(pos("4k3/8/8/8/8/8/8/R3K3 w - - 149 100").outcome(), None);
        let p = pos("4k3/8/8/8/8/8/8/R3K3 w - - 150 100");
        assert!(p.is_seventyfive_moves());
        assert_eq!(p.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn legal_moves_flip_side_and_keep_king_safe() {
        let p = pos("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        for m in p.legal_moves() {
            let next = p.apply(&m);
            assert_ne!(next.side_to_move(), p.side_to_move());
            assert!(!next.is_in_check(p.side_to_move()), "{} exposes the king", m);
        }
    }

    #[test]
    fn attack_detection_sees_through_empty_squares_only() {
        let p = pos("4k3/8/8/8/8/8/4P3/r3K3 w - - 0 1");
        assert!(p.is_square_attacked(Square::D1, Color::Black));
        assert!(p.is_check());
        let e3 = Square::from_algebraic("e3").unwrap();
        assert!(!p.is_square_attacked(e3, Color::Black));
        let d3 = Square::from_algebraic("d3").unwrap();
        assert!(p.is_square_attacked(d3, Color::White));
    }
}
