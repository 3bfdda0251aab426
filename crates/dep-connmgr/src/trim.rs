//! Water-mark based trimming (§4.6.2).

use std::time::{Duration, Instant};

use dep_core::{Direction, NodeId};

use crate::tagging::TagBook;

/// A point-in-time view of one open connection, as seen by whoever owns
/// the connection pool (the swarm). `trim_open_conns` is a pure function
/// over a snapshot of these plus the tag book; it never touches sockets
/// itself — the caller closes whatever ids come back.
#[derive(Debug, Clone, Copy)]
pub struct ConnSnapshot {
    pub conn_id: u64,
    pub peer: NodeId,
    pub direction: Direction,
    pub opened_at: Instant,
    pub stream_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct WaterMarks {
    pub low_water: usize,
    pub high_water: usize,
    pub grace_period: Duration,
}

impl Default for WaterMarks {
    fn default() -> Self {
        Self {
            low_water: 100,
            high_water: 400,
            grace_period: Duration::from_secs(20),
        }
    }
}

fn candidate_score(tag_book: &TagBook, snapshot: &ConnSnapshot) -> i32 {
    let mut score = tag_book.score(&snapshot.peer);
    if snapshot.direction == Direction::Outbound {
        score += 10;
    }
    if snapshot.stream_count > 0 {
        score += 20;
    }
    score
}

/// Returns the `conn_id`s to close, per the §4.6.2 algorithm, evaluated
/// against `now`. Protected peers and connections younger than
/// `grace_period` are never candidates.
pub fn trim_open_conns(
    connections: &[ConnSnapshot],
    tag_book: &TagBook,
    marks: &WaterMarks,
    now: Instant,
) -> Vec<u64> {
    let current = connections.len();
    if current <= marks.low_water {
        return Vec::new();
    }

    let mut candidates: Vec<(i32, &ConnSnapshot)> = connections
        .iter()
        .filter(|c| !tag_book.is_protected(&c.peer, None))
        .filter(|c| now.saturating_duration_since(c.opened_at) > marks.grace_period)
        .map(|c| (candidate_score(tag_book, c), c))
        .collect();

    candidates.sort_by_key(|(score, _)| *score);

    let to_close = current - marks.low_water;
    candidates
        .into_iter()
        .take(to_close)
        .map(|(_, c)| c.conn_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    fn snapshot(id: u64, peer_byte: u8, direction: Direction, age: Duration) -> ConnSnapshot {
        ConnSnapshot {
            conn_id: id,
            peer: peer(peer_byte),
            direction,
            opened_at: Instant::now() - age,
            stream_count: 0,
        }
    }

    #[test]
    fn no_trim_below_low_water() {
        let book = TagBook::new();
        let marks = WaterMarks {
            low_water: 10,
            high_water: 20,
            grace_period: Duration::ZERO,
        };
        let conns = vec![snapshot(1, 1, Direction::Outbound, Duration::from_secs(60))];
        assert!(trim_open_conns(&conns, &book, &marks, Instant::now()).is_empty());
    }

    #[test]
    fn trims_lowest_scoring_down_to_low_water() {
        let book = TagBook::new();
        let marks = WaterMarks {
            low_water: 2,
            high_water: 4,
            grace_period: Duration::ZERO,
        };
        let conns: Vec<_> = (1..=5)
            .map(|i| snapshot(i, i as u8, Direction::Outbound, Duration::from_secs(60)))
            .collect();
        let closed = trim_open_conns(&conns, &book, &marks, Instant::now());
        assert_eq!(closed.len(), 3);
        assert_eq!(conns.len() - closed.len(), 2);
    }

    #[test]
    fn protected_peer_never_a_candidate() {
        let book = TagBook::new();
        book.protect(peer(1), crate::tagging::TAG_BOOTSTRAP);
        let marks = WaterMarks {
            low_water: 0,
            high_water: 1,
            grace_period: Duration::ZERO,
        };
        let conns = vec![
            snapshot(1, 1, Direction::Outbound, Duration::from_secs(60)),
            snapshot(2, 2, Direction::Outbound, Duration::from_secs(60)),
        ];
        let closed = trim_open_conns(&conns, &book, &marks, Instant::now());
        assert_eq!(closed, vec![2]);
    }

    #[test]
    fn fresh_connections_survive_grace_period() {
        let book = TagBook::new();
        let marks = WaterMarks {
            low_water: 0,
            high_water: 1,
            grace_period: Duration::from_secs(20),
        };
        let conns = vec![snapshot(1, 1, Direction::Outbound, Duration::from_secs(1))];
        assert!(trim_open_conns(&conns, &book, &marks, Instant::now()).is_empty());
    }

    #[test]
    fn higher_score_survives_over_lower() {
        let book = TagBook::new();
        book.tag_peer(peer(2), "priority", 100);
        let marks = WaterMarks {
            low_water: 1,
            high_water: 2,
            grace_period: Duration::ZERO,
        };
        let conns = vec![
            snapshot(1, 1, Direction::Inbound, Duration::from_secs(60)),
            snapshot(2, 2, Direction::Inbound, Duration::from_secs(60)),
        ];
        let closed = trim_open_conns(&conns, &book, &marks, Instant::now());
        assert_eq!(closed, vec![1]);
    }
}
