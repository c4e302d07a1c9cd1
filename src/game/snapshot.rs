//! Per-recipient snapshot building. The right-side player gets every x
//! coordinate mirrored, so each client draws itself on the left.

use crate::ws::protocol::{Point, ServerMsg, Side, Snapshot};

use super::physics::{Ball, Paddle};

fn oriented(x: f32, y: f32, side: Side) -> Point {
    match side {
        Side::Left => Point { x, y },
        Side::Right => Point { x: -x, y },
    }
}

/// `[left, right]` score re-ordered as `[recipient, opponent]`
pub fn oriented_score(score: [u8; 2], side: Side) -> [u8; 2] {
    [score[side.index()], score[side.opposite().index()]]
}

/// Build the state push for the player on `side`
pub fn build(
    match_id: u64,
    tick: u64,
    side: Side,
    ball: &Ball,
    paddles: &[Paddle; 2],
    score: [u8; 2],
) -> ServerMsg {
    let you = &paddles[side.index()];
    let opponent = &paddles[side.opposite().index()];

    ServerMsg::State(Snapshot {
        match_id,
        tick,
        side,
        ball: oriented(ball.x, ball.y, side),
        you: oriented(you.x, you.y, side),
        opponent: oriented(opponent.x, opponent.y, side),
        score: oriented_score(score, side),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_player_sees_itself_on_the_left() {
        let mut ball = Ball::serve(Side::Right);
        ball.x = 0.4;
        ball.y = -0.3;
        let mut paddles = [Paddle::new(Side::Left), Paddle::new(Side::Right)];
        paddles[1].y = 0.5;

        let ServerMsg::State(left) = build(1, 10, Side::Left, &ball, &paddles, [2, 1]) else {
            panic!("expected state push");
        };
        let ServerMsg::State(right) = build(1, 10, Side::Right, &ball, &paddles, [2, 1]) else {
            panic!("expected state push");
        };

        assert_eq!(left.ball, Point { x: 0.4, y: -0.3 });
        assert_eq!(right.ball, Point { x: -0.4, y: -0.3 });
        assert!(left.you.x < 0.0 && right.you.x < 0.0);
        assert_eq!(right.you.y, 0.5);
        assert_eq!(left.score, [2, 1]);
        assert_eq!(right.score, [1, 2]);
        assert_eq!(right.side, Side::Right);
    }
}
