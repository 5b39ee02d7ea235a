//! Headless demo scenes
//!
//! Each scene builds a [`World`], drives it through a [`StepClock`] at a
//! fixed render rate and summarises the outcome in a serializable report.

use anyhow::{Context, Result};
use serde::Serialize;

use pegbox_core::math::Vec2;
use pegbox_core::time::{FixedTimeStep, StepClock, Stopwatch};
use pegbox_physics::{
    BodyDef, BodyHandle, ChainShape, CircleShape, EdgeShape, FixtureDef, PolygonShape, World, WorldConfig,
};

/// How a scene is driven in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Physics rate in hertz
    pub hz: f64,
    /// Simulated render frame length in seconds
    pub frame: f64,
    /// Simulated seconds to run
    pub seconds: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            hz: 60.0,
            frame: 1.0 / 60.0,
            seconds: 5.0,
        }
    }
}

/// Bookkeeping shared by every report
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub steps: u64,
    pub simulated_seconds: f64,
    pub wall_seconds: f64,
    pub bodies: usize,
    pub contacts: usize,
    pub proxies: usize,
    pub tree_height: i32,
}

impl RunStats {
    fn collect(world: &World, clock: &StepClock, stopwatch: &Stopwatch) -> Self {
        Self {
            steps: clock.step_count(),
            simulated_seconds: clock.total_time(),
            wall_seconds: stopwatch.elapsed_secs(),
            bodies: world.body_count(),
            contacts: world.contact_count(),
            proxies: world.proxy_count(),
            tree_height: world.tree_height(),
        }
    }
}

/// Advance `world` until `timing.seconds` of simulated time have passed.
/// `on_frame` runs after every render frame and may stop the run early by
/// returning false.
fn drive<F>(world: &mut World, timing: &Timing, mut on_frame: F) -> (StepClock, Stopwatch)
where
    F: FnMut(&World, &StepClock) -> bool,
{
    let mut clock = StepClock::new(FixedTimeStep::from_hz(timing.hz));
    let stopwatch = Stopwatch::new();
    while clock.total_time() < timing.seconds {
        clock.advance(timing.frame, world);
        if !on_frame(world, &clock) {
            break;
        }
    }
    (clock, stopwatch)
}

fn ground_edge(world: &mut World, half_width: f32) -> Result<BodyHandle> {
    let ground = world.create_body(&BodyDef::default());
    let edge = EdgeShape::new(Vec2::new(-half_width, 0.0), Vec2::new(half_width, 0.0))?;
    world.create_fixture(ground, &FixtureDef::new(edge))?;
    Ok(ground)
}

#[derive(Debug, Clone, Serialize)]
pub struct DropReport {
    pub start_height: f32,
    pub radius: f32,
    pub restitution: f32,
    /// Simulated time when the ball fell asleep
    pub time_to_sleep: Option<f64>,
    pub rest_height: f32,
    pub max_bounce_speed: f32,
    pub stats: RunStats,
}

/// Drop a single ball onto flat ground and wait for it to sleep.
pub fn drop_ball(config: WorldConfig, height: f32, radius: f32, restitution: f32, timing: &Timing) -> Result<DropReport> {
    let mut world = World::new(config);
    ground_edge(&mut world, 20.0)?;

    let ball = world.create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, height)));
    let circle = CircleShape::new(Vec2::ZERO, radius)?;
    world.create_fixture(
        ball,
        &FixtureDef::new(circle)
            .with_density(1.0)
            .with_restitution(restitution),
    )?;

    let mut time_to_sleep = None;
    let mut max_bounce_speed = 0.0f32;
    let (clock, stopwatch) = drive(&mut world, timing, |world, clock| {
        let Some(body) = world.body(ball) else {
            return false;
        };
        max_bounce_speed = max_bounce_speed.max(body.linear_velocity().y);
        if !body.is_awake() {
            time_to_sleep = Some(clock.total_time());
            return false;
        }
        true
    });

    let body = world.body(ball).context("ball vanished")?;
    log::info!("ball settled at y = {:.4}", body.position().y);

    Ok(DropReport {
        start_height: height,
        radius,
        restitution,
        time_to_sleep,
        rest_height: body.position().y,
        max_bounce_speed,
        stats: RunStats::collect(&world, &clock, &stopwatch),
    })
}

/// Parameters of the peg board
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardLayout {
    pub rows: u32,
    pub columns: u32,
    pub balls: u32,
    pub spacing: f32,
    pub peg_radius: f32,
    pub ball_radius: f32,
    pub chutes: u32,
    pub seed: u64,
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self {
            rows: 10,
            columns: 11,
            balls: 50,
            spacing: 1.0,
            peg_radius: 0.1,
            ball_radius: 0.2,
            chutes: 12,
            seed: 7,
        }
    }
}

impl BoardLayout {
    fn half_width(&self) -> f32 {
        0.5 * self.spacing * self.columns as f32
    }

    fn chute_height(&self) -> f32 {
        2.0 * self.spacing
    }

    fn chute_of(&self, x: f32) -> usize {
        let width = 2.0 * self.half_width() / self.chutes as f32;
        let index = ((x + self.half_width()) / width).floor();
        (index.max(0.0) as usize).min(self.chutes as usize - 1)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardReport {
    pub rows: u32,
    pub balls: u32,
    pub chute_counts: Vec<u32>,
    pub final_positions: Vec<[f32; 2]>,
    pub asleep: usize,
    pub stats: RunStats,
}

/// Tiny LCG so the board is reproducible from `--seed`
struct Jitter(u64);

impl Jitter {
    fn next(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32 / (1u64 << 24) as f32) - 0.5
    }
}

/// Drop balls through a staggered grid of pegs into a row of chutes.
pub fn peg_board(config: WorldConfig, layout: BoardLayout, timing: &Timing) -> Result<BoardReport> {
    anyhow::ensure!(layout.chutes > 0, "a board needs at least one chute");
    anyhow::ensure!(layout.columns > 0, "a board needs at least one peg column");

    let mut world = World::new(config);
    let half = layout.half_width();
    let chute_top = layout.chute_height();
    let board_top = chute_top + layout.spacing * (layout.rows as f32 + 1.0);
    let hopper_rows = (layout.balls / 4 + 1) as f32;
    let wall_top = board_top + 2.0 + hopper_rows * 2.5 * layout.ball_radius;

    // Open box: walls and floor as one chain, listed right to left along the floor.
    let frame = world.create_body(&BodyDef::default());
    let outline = ChainShape::new_chain(
        &[
            Vec2::new(half, wall_top),
            Vec2::new(half, 0.0),
            Vec2::new(-half, 0.0),
            Vec2::new(-half, wall_top),
        ],
        None,
        None,
    )?;
    world.create_fixture(frame, &FixtureDef::new(outline).with_friction(0.3))?;

    let chute_width = 2.0 * half / layout.chutes as f32;
    for i in 1..layout.chutes {
        let x = -half + i as f32 * chute_width;
        let divider = EdgeShape::new(Vec2::new(x, 0.0), Vec2::new(x, chute_top))?;
        world.create_fixture(frame, &FixtureDef::new(divider))?;
    }

    for row in 0..layout.rows {
        let y = chute_top + layout.spacing * (row as f32 + 1.0);
        let offset = if row % 2 == 0 { 0.5 } else { 0.0 };
        for column in 0..layout.columns {
            let x = -half + layout.spacing * (column as f32 + offset);
            if x <= -half + layout.peg_radius || x >= half - layout.peg_radius {
                continue;
            }
            let peg = CircleShape::new(Vec2::new(x, y), layout.peg_radius)?;
            world.create_fixture(frame, &FixtureDef::new(peg).with_friction(0.1))?;
        }
    }

    let mut jitter = Jitter(layout.seed);
    let circle = CircleShape::new(Vec2::ZERO, layout.ball_radius)?;
    let fixture = FixtureDef::new(circle)
        .with_density(1.0)
        .with_friction(0.2)
        .with_restitution(0.3);

    let mut balls = Vec::with_capacity(layout.balls as usize);
    for i in 0..layout.balls {
        let row = (i / 4) as f32;
        let x = 2.2 * layout.ball_radius * ((i % 4) as f32 - 1.5) + 0.1 * jitter.next();
        let y = board_top + 1.0 + row * 2.5 * layout.ball_radius;
        let body = world.create_body(&BodyDef::dynamic().with_position(Vec2::new(x, y)));
        world.create_fixture(body, &fixture)?;
        balls.push(body);
    }
    log::info!(
        "peg board: {} rows, {} balls, {} fixtures",
        layout.rows,
        layout.balls,
        world.fixture_count()
    );

    let (clock, stopwatch) = drive(&mut world, timing, |_, _| true);

    let mut chute_counts = vec![0; layout.chutes as usize];
    let mut final_positions = Vec::with_capacity(balls.len());
    let mut asleep = 0;
    for &handle in &balls {
        let body = world.body(handle).context("ball vanished")?;
        let p = body.position();
        final_positions.push([p.x, p.y]);
        if !body.is_awake() {
            asleep += 1;
        }
        if p.y < chute_top {
            chute_counts[layout.chute_of(p.x)] += 1;
        }
    }

    Ok(BoardReport {
        rows: layout.rows,
        balls: layout.balls,
        chute_counts,
        final_positions,
        asleep,
        stats: RunStats::collect(&world, &clock, &stopwatch),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct StackReport {
    pub base: u32,
    pub boxes: usize,
    /// Largest horizontal distance any box moved from where it was placed
    pub max_drift: f32,
    pub top_height: f32,
    pub all_asleep: bool,
    pub stats: RunStats,
}

/// Build a pyramid of unit boxes on a slab and let it settle.
pub fn box_stack(config: WorldConfig, base: u32, timing: &Timing) -> Result<StackReport> {
    anyhow::ensure!(base > 0, "the pyramid base needs at least one box");

    let mut world = World::new(config);
    let ground = world.create_body(&BodyDef::default().with_position(Vec2::new(0.0, -0.5)));
    world.create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(40.0, 0.5)?))?;

    let half = 0.5;
    let square = FixtureDef::new(PolygonShape::new_box(half, half)?)
        .with_density(5.0)
        .with_friction(0.6);

    let mut boxes = Vec::new();
    for level in 0..base {
        let count = base - level;
        let y = half + level as f32 * 2.0 * half;
        let x0 = -(count as f32 - 1.0) * half * 1.05;
        for i in 0..count {
            let start = Vec2::new(x0 + i as f32 * 2.1 * half, y);
            let body = world.create_body(&BodyDef::dynamic().with_position(start));
            world.create_fixture(body, &square)?;
            boxes.push((body, start));
        }
    }

    let (clock, stopwatch) = drive(&mut world, timing, |_, _| true);

    let mut max_drift = 0.0f32;
    let mut top_height = 0.0f32;
    let mut all_asleep = true;
    for &(handle, start) in &boxes {
        let body = world.body(handle).context("box vanished")?;
        max_drift = max_drift.max((body.position().x - start.x).abs());
        top_height = top_height.max(body.position().y);
        all_asleep &= !body.is_awake();
    }
    if max_drift > 0.5 {
        log::warn!("pyramid drifted {max_drift:.3} m, it probably toppled");
    }

    Ok(StackReport {
        base,
        boxes: boxes.len(),
        max_drift,
        top_height,
        all_asleep,
        stats: RunStats::collect(&world, &clock, &stopwatch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_settles_on_ground() {
        let timing = Timing {
            seconds: 10.0,
            ..Timing::default()
        };
        let report = drop_ball(WorldConfig::default(), 4.0, 0.5, 0.0, &timing).unwrap();
        assert!(report.time_to_sleep.is_some());
        assert!((report.rest_height - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_bouncy_drop_rebounds() {
        let timing = Timing {
            seconds: 2.0,
            ..Timing::default()
        };
        let report = drop_ball(WorldConfig::default(), 3.0, 0.25, 0.8, &timing).unwrap();
        assert!(report.max_bounce_speed > 1.0);
    }

    #[test]
    fn test_chute_index_is_clamped() {
        let layout = BoardLayout::default();
        assert_eq!(layout.chute_of(-100.0), 0);
        assert_eq!(layout.chute_of(100.0), layout.chutes as usize - 1);
        assert_eq!(layout.chute_of(-layout.half_width() + 0.01), 0);
    }

    #[test]
    fn test_board_keeps_balls_inside() {
        let layout = BoardLayout {
            rows: 4,
            balls: 8,
            ..BoardLayout::default()
        };
        let timing = Timing {
            seconds: 6.0,
            ..Timing::default()
        };
        let report = peg_board(WorldConfig::default(), layout, &timing).unwrap();
        assert_eq!(report.final_positions.len(), 8);
        let half = layout.half_width();
        for [x, y] in &report.final_positions {
            assert!(x.abs() <= half);
            assert!(*y >= 0.0);
        }
        assert!(report.chute_counts.iter().sum::<u32>() <= 8);
    }

    #[test]
    fn test_board_is_deterministic() {
        let layout = BoardLayout {
            rows: 3,
            balls: 6,
            ..BoardLayout::default()
        };
        let timing = Timing {
            seconds: 2.0,
            ..Timing::default()
        };
        let a = peg_board(WorldConfig::default(), layout, &timing).unwrap();
        let b = peg_board(WorldConfig::default(), layout, &timing).unwrap();
        assert_eq!(a.final_positions, b.final_positions);
    }

    #[test]
    fn test_small_pyramid_stands() {
        let timing = Timing {
            seconds: 4.0,
            ..Timing::default()
        };
        let report = box_stack(WorldConfig::default(), 3, &timing).unwrap();
        assert_eq!(report.boxes, 6);
        assert!(report.max_drift < 0.1);
        assert!(report.top_height > 2.0);
    }

    #[test]
    fn test_empty_stack_is_rejected() {
        assert!(box_stack(WorldConfig::default(), 0, &Timing::default()).is_err());
    }

    #[test]
    fn test_slow_frames_run_several_steps() {
        let timing = Timing {
            hz: 60.0,
            frame: 1.0 / 20.0,
            seconds: 1.0,
        };
        let report = drop_ball(WorldConfig::default(), 10.0, 0.5, 0.0, &timing).unwrap();
        assert!((60..=63).contains(&report.stats.steps));
    }
}
