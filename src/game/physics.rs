//! Ball and paddle physics in the normalized [-1, 1] court

use std::f32::consts::PI;

use crate::ws::protocol::{Direction, Side};

/// Court half-extent on both axes
pub const COURT_HALF: f32 = 1.0;

/// Ball defaults (distance per tick)
pub const BALL_RADIUS: f32 = 0.02;
pub const BALL_SPEED: f32 = 0.02;

/// Paddle defaults
pub const PADDLE_WIDTH: f32 = 0.03;
pub const PADDLE_HEIGHT: f32 = 0.3;
pub const PADDLE_STEP: f32 = 0.03;

/// Extra vertical velocity, as a fraction of speed, given by a spin return
pub const SPIN_BIAS: f32 = 0.35;

/// Steepest allowed bounce, measured from the horizontal
pub const MAX_BOUNCE_ANGLE: f32 = PI / 3.0;

/// Ball state. Velocity is kept as angle + speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed: f32,
    pub radius: f32,
}

impl Ball {
    /// Fresh ball at the centre, heading towards `toward`
    pub fn serve(toward: Side) -> Self {
        let angle = match toward {
            Side::Right => 0.0,
            Side::Left => PI,
        };
        Self {
            x: 0.0,
            y: 0.0,
            angle,
            speed: BALL_SPEED,
            radius: BALL_RADIUS,
        }
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.speed * self.angle.cos(), self.speed * self.angle.sin())
    }

    fn set_velocity(&mut self, vx: f32, vy: f32) {
        self.angle = vy.atan2(vx);
    }

    pub fn advance(&mut self) {
        let (vx, vy) = self.velocity();
        self.x += vx;
        self.y += vy;
    }

    /// Side whose edge the ball has fully left, if any
    pub fn exited(&self) -> Option<Side> {
        if self.x < -COURT_HALF {
            Some(Side::Left)
        } else if self.x > COURT_HALF {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// Paddle state plus its commanded input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub side: Side,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub up: bool,
    pub down: bool,
    /// Pointer target; cleared by key input
    pub drag_target: Option<f32>,
}

impl Paddle {
    /// Paddle at its court edge, vertically centred
    pub fn new(side: Side) -> Self {
        let edge = COURT_HALF - PADDLE_WIDTH / 2.0;
        let x = match side {
            Side::Left => -edge,
            Side::Right => edge,
        };
        Self {
            side,
            x,
            y: 0.0,
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
            up: false,
            down: false,
            drag_target: None,
        }
    }

    /// Highest centre position that keeps the paddle inside the court
    pub fn travel_limit(&self) -> f32 {
        COURT_HALF - self.height / 2.0
    }

    /// Apply a key press/release. Returns false when nothing changed.
    pub fn set_key(&mut self, direction: Direction, pressed: bool) -> bool {
        let flag = match direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        };
        if *flag == pressed && self.drag_target.is_none() {
            return false;
        }
        *flag = pressed;
        self.drag_target = None;
        true
    }

    /// Aim at a pointer position. Returns false when nothing changed.
    pub fn set_drag(&mut self, y: f32) -> bool {
        let target = y.clamp(-self.travel_limit(), self.travel_limit());
        if self.drag_target == Some(target) {
            return false;
        }
        self.drag_target = Some(target);
        self.up = false;
        self.down = false;
        true
    }

    /// Commanded direction: +1 up, -1 down, 0 idle
    pub fn direction(&self) -> f32 {
        match (self.up, self.down) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => match self.drag_target {
                Some(target) if (target - self.y).abs() > f32::EPSILON => (target - self.y).signum(),
                _ => 0.0,
            },
        }
    }

    /// Move at most one step towards the commanded direction
    pub fn advance(&mut self) {
        let step = match self.drag_target {
            Some(target) if !self.up && !self.down => (target - self.y).abs().min(PADDLE_STEP),
            _ => PADDLE_STEP,
        };
        let limit = self.travel_limit();
        self.y = (self.y + self.direction() * step).clamp(-limit, limit);
    }

    /// Clamped-distance test: closest point of the paddle rectangle to the
    /// ball centre, compared against the radius
    pub fn touches(&self, ball: &Ball) -> bool {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let closest_x = ball.x.clamp(self.x - half_w, self.x + half_w);
        let closest_y = ball.y.clamp(self.y - half_h, self.y + half_h);
        let dx = ball.x - closest_x;
        let dy = ball.y - closest_y;
        dx * dx + dy * dy <= ball.radius * ball.radius
    }
}

/// Reflect off the top/bottom walls. Only the vertical component flips.
pub fn bounce_walls(ball: &mut Ball) -> bool {
    let (_, vy) = ball.velocity();
    let hit_top = ball.y + ball.radius >= COURT_HALF && vy > 0.0;
    let hit_bottom = ball.y - ball.radius <= -COURT_HALF && vy < 0.0;
    if hit_top || hit_bottom {
        ball.angle = -ball.angle;
        true
    } else {
        false
    }
}

/// Return the ball off a paddle. Only balls travelling towards the paddle's
/// side bounce. A paddle moving into the half of itself that the ball struck
/// adds spin; anything else is a plain horizontal mirror.
pub fn bounce_paddle(ball: &mut Ball, paddle: &Paddle) -> bool {
    let (vx, vy) = ball.velocity();
    let incoming = match paddle.side {
        Side::Left => vx < 0.0,
        Side::Right => vx > 0.0,
    };
    if !incoming || !paddle.touches(ball) {
        return false;
    }

    let moving = paddle.direction();
    let struck_half = (ball.y - paddle.y).signum();
    if moving != 0.0 && struck_half == moving {
        let spun_vy = vy + moving * SPIN_BIAS * ball.speed;
        let norm = (vx * vx + spun_vy * spun_vy).sqrt();
        let max_sin = MAX_BOUNCE_ANGLE.sin();
        let sin = (spun_vy / norm).clamp(-max_sin, max_sin);
        let cos = (1.0 - sin * sin).sqrt();
        ball.set_velocity(-vx.signum() * cos, sin);
    } else {
        ball.set_velocity(-vx, vy);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(x: f32, y: f32, angle: f32) -> Ball {
        Ball {
            x,
            y,
            angle,
            ..Ball::serve(Side::Right)
        }
    }

    #[test]
    fn ball_moves_at_most_speed_per_tick() {
        for angle in [0.0, 0.4, 1.2, 2.5, -2.0, PI] {
            let mut ball = ball_at(0.1, -0.2, angle);
            let (x0, y0) = (ball.x, ball.y);
            ball.advance();
            let moved = ((ball.x - x0).powi(2) + (ball.y - y0).powi(2)).sqrt();
            assert!(moved <= ball.speed + 1e-6, "moved {moved}");
        }
    }

    #[test]
    fn paddle_stays_inside_court() {
        let mut paddle = Paddle::new(Side::Left);
        paddle.set_key(Direction::Up, true);
        for _ in 0..200 {
            let before = paddle.y;
            paddle.advance();
            assert!((paddle.y - before).abs() <= PADDLE_STEP + 1e-6);
            assert!(paddle.y <= 1.0 - paddle.height / 2.0 + 1e-6);
        }
        paddle.set_key(Direction::Up, false);
        paddle.set_key(Direction::Down, true);
        for _ in 0..200 {
            paddle.advance();
            assert!(paddle.y >= -1.0 + paddle.height / 2.0 - 1e-6);
        }
    }

    #[test]
    fn duplicate_key_is_noop() {
        let mut paddle = Paddle::new(Side::Right);
        assert!(paddle.set_key(Direction::Down, true));
        assert!(!paddle.set_key(Direction::Down, true));
        assert!(paddle.set_key(Direction::Down, false));
    }

    #[test]
    fn drag_lands_exactly_on_target() {
        let mut paddle = Paddle::new(Side::Left);
        paddle.set_drag(0.1);
        for _ in 0..10 {
            paddle.advance();
        }
        assert!((paddle.y - 0.1).abs() < 1e-6);
        assert_eq!(paddle.direction(), 0.0);

        // Out-of-court targets clamp to the travel limit
        paddle.set_drag(5.0);
        assert_eq!(paddle.drag_target, Some(paddle.travel_limit()));
    }

    #[test]
    fn wall_flips_vertical_component_only() {
        let mut ball = ball_at(0.0, 0.99, 0.5);
        let (vx, vy) = ball.velocity();
        assert!(bounce_walls(&mut ball));
        let (vx2, vy2) = ball.velocity();
        assert!((vx - vx2).abs() < 1e-6);
        assert!((vy + vy2).abs() < 1e-6);

        // Already heading away: no second flip
        assert!(!bounce_walls(&mut ball));
    }

    #[test]
    fn still_paddle_mirrors_horizontally() {
        let paddle = Paddle::new(Side::Right);
        let mut ball = ball_at(paddle.x - 0.02, 0.05, 0.3);
        let (vx, vy) = ball.velocity();
        assert!(bounce_paddle(&mut ball, &paddle));
        let (vx2, vy2) = ball.velocity();
        assert!((vx + vx2).abs() < 1e-6);
        assert!((vy - vy2).abs() < 1e-6);
    }

    #[test]
    fn moving_paddle_adds_spin_on_leading_half() {
        let mut paddle = Paddle::new(Side::Left);
        paddle.up = true;
        let mut ball = ball_at(paddle.x + 0.02, 0.05, PI);
        assert!(bounce_paddle(&mut ball, &paddle));
        let (vx, vy) = ball.velocity();
        assert!(vx > 0.0);
        assert!(vy > 0.0, "spin pushes the ball upward");
        assert!(ball.angle.abs() <= MAX_BOUNCE_ANGLE + 1e-5);
    }

    #[test]
    fn moving_paddle_trailing_half_is_plain_mirror() {
        let mut paddle = Paddle::new(Side::Left);
        paddle.up = true;
        let mut ball = ball_at(paddle.x + 0.02, -0.05, PI);
        assert!(bounce_paddle(&mut ball, &paddle));
        let (vx, vy) = ball.velocity();
        assert!(vx > 0.0);
        assert!(vy.abs() < 1e-6);
    }

    #[test]
    fn outgoing_ball_passes_through() {
        let paddle = Paddle::new(Side::Left);
        let mut ball = ball_at(paddle.x + 0.02, 0.0, 0.0);
        assert!(!bounce_paddle(&mut ball, &paddle));
    }

    #[test]
    fn exits_are_detected_per_edge() {
        assert_eq!(ball_at(-1.01, 0.0, PI).exited(), Some(Side::Left));
        assert_eq!(ball_at(1.01, 0.0, 0.0).exited(), Some(Side::Right));
        assert_eq!(ball_at(0.99, 0.0, 0.0).exited(), None);
    }
}
