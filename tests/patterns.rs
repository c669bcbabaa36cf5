use std::collections::HashSet;

use rand::Rng;
use rand::SeedableRng;
use sparse_life::cpu;
use sparse_life::{Coord, World};

fn world(cells: &[(i32, i32)]) -> World {
    cells.iter().map(|&c| Coord::from(c)).collect()
}

fn translated(cells: &[(i32, i32)], dx: i32, dy: i32) -> Vec<(i32, i32)> {
    cells.iter().map(|&(x, y)| (x + dx, y + dy)).collect()
}

fn collect_live(world: &World) -> HashSet<(i32, i32)> {
    world.active.iter().map(|c| (c.x, c.y)).collect()
}

fn assert_alive(world: &World, cells: &[(i32, i32)]) {
    for &(x, y) in cells {
        assert!(world.is_alive(Coord::new(x, y)), "expected alive at ({x},{y})");
    }
}

fn assert_dead(world: &World, cells: &[(i32, i32)]) {
    for &(x, y) in cells {
        assert!(!world.is_alive(Coord::new(x, y)), "expected dead at ({x},{y})");
    }
}

fn run(mut world: World, generations: usize) -> World {
    for _ in 0..generations {
        world = cpu::step(&world);
    }
    world
}

fn step_naive(cells: &HashSet<(i64, i64)>) -> HashSet<(i64, i64)> {
    let mut next = HashSet::new();
    let mut candidates = HashSet::new();
    for &(x, y) in cells {
        for dy in -1..=1 {
            for dx in -1..=1 {
                candidates.insert((x + dx, y + dy));
            }
        }
    }

    for (x, y) in candidates {
        let mut neighbors = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if cells.contains(&(x + dx, y + dy)) {
                    neighbors += 1;
                }
            }
        }
        let alive = cells.contains(&(x, y));
        let next_alive = if alive {
            neighbors == 2 || neighbors == 3
        } else {
            neighbors == 3
        };
        if next_alive {
            next.insert((x, y));
        }
    }

    next
}

const BLOCK: [(i32, i32); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];
const BEEHIVE: [(i32, i32); 6] = [(1, 0), (2, 0), (0, 1), (3, 1), (1, 2), (2, 2)];
const TOAD: [(i32, i32); 6] = [(1, 0), (2, 0), (3, 0), (0, 1), (1, 1), (2, 1)];
const GLIDER: [(i32, i32); 5] = [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];

#[test]
fn block_is_stable() {
    let start = world(&BLOCK);
    let mut w = start.clone();
    for _ in 0..5 {
        w = cpu::step(&w);
        assert_eq!(w.active, start.active);
        assert_eq!(w.candidates, start.active);
    }
}

#[test]
fn beehive_is_stable() {
    let start = world(&BEEHIVE);
    let after = run(start.clone(), 10);
    assert_eq!(after.active, start.active);
}

#[test]
fn blinker_oscillates() {
    let horizontal = [(-1, 0), (0, 0), (1, 0)];
    let vertical = [(0, -1), (0, 0), (0, 1)];

    let w1 = cpu::step(&world(&horizontal));
    assert_alive(&w1, &vertical);
    assert_dead(&w1, &[(-1, 0), (1, 0)]);
    assert_eq!(w1.population(), 3);

    let w2 = cpu::step(&w1);
    assert_alive(&w2, &horizontal);
    assert_dead(&w2, &[(0, -1), (0, 1)]);
    assert_eq!(w2.active, world(&horizontal).active);
}

#[test]
fn toad_has_period_two() {
    let start = world(&TOAD);
    let w1 = cpu::step(&start);
    assert_ne!(w1.active, start.active);
    assert_eq!(w1.population(), 6);
    let w2 = cpu::step(&w1);
    assert_eq!(w2.active, start.active);
}

#[test]
fn glider_translates_diagonally() {
    let after = run(world(&GLIDER), 4);
    assert_eq!(after.active, world(&translated(&GLIDER, 1, 1)).active);

    let after = run(world(&GLIDER), 40);
    assert_eq!(after.active, world(&translated(&GLIDER, 10, 10)).active);
}

#[test]
fn rule_table_applies_to_every_neighbor_count() {
    let ring: Vec<(i32, i32)> = Coord::ORIGIN.neighbors().map(|c| (c.x, c.y)).collect();
    assert_eq!(ring.len(), 8);

    for n in 0..=8 {
        for center_alive in [false, true] {
            let mut cells: Vec<(i32, i32)> = ring[..n].to_vec();
            if center_alive {
                cells.push((0, 0));
            }
            let next = cpu::step(&world(&cells));
            let expected = if center_alive { n == 2 || n == 3 } else { n == 3 };
            assert_eq!(
                next.is_alive(Coord::ORIGIN),
                expected,
                "center_alive={center_alive} neighbors={n}"
            );
        }
    }
}

#[test]
fn lone_cells_and_pairs_die() {
    assert!(cpu::step(&world(&[(7, -3)])).is_empty());
    assert!(cpu::step(&world(&[(0, 0), (1, 0)])).is_empty());
}

#[test]
fn evolution_is_translation_invariant_far_from_origin() {
    let reference: Vec<World> = {
        let mut w = world(&GLIDER);
        (0..20)
            .map(|_| {
                w = cpu::step(&w);
                w.clone()
            })
            .collect()
    };

    let offsets = [
        (i32::MAX / 2, i32::MAX / 2),
        (-(i32::MAX / 2), 7),
        (-1_000, -1_000),
        (i32::MIN + 100, i32::MAX - 100),
    ];
    for (dx, dy) in offsets {
        let mut w = world(&translated(&GLIDER, dx, dy));
        for (generation, expected) in reference.iter().enumerate() {
            w = cpu::step(&w);
            let expected: HashSet<(i32, i32)> = collect_live(expected)
                .into_iter()
                .map(|(x, y)| (x + dx, y + dy))
                .collect();
            assert_eq!(collect_live(&w), expected, "offset ({dx},{dy}) generation {generation}");
        }
    }
}

#[test]
fn edge_of_the_plane_acts_as_dead_cells() {
    // The missing column past i32::MAX can never be born.
    let blinker = [(i32::MAX, -1), (i32::MAX, 0), (i32::MAX, 1)];
    let w1 = cpu::step(&world(&blinker));
    assert_eq!(w1.active, world(&[(i32::MAX - 1, 0), (i32::MAX, 0)]).active);
    let w2 = cpu::step(&w1);
    assert!(w2.is_empty());

    let corner = [(i32::MIN, i32::MIN), (i32::MIN + 1, i32::MIN), (i32::MIN, i32::MIN + 1), (i32::MIN + 1, i32::MIN + 1)];
    let w = run(world(&corner), 3);
    assert_eq!(w.active, world(&corner).active);
}

#[test]
fn matches_naive_on_small_random_seed() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xBADC0FFEE);
    let mut cells = Vec::new();
    for y in -8..=8 {
        for x in -8..=8 {
            if rng.random::<f64>() < 0.33 {
                cells.push((x, y));
            }
        }
    }

    let mut w = world(&cells);
    let mut naive: HashSet<(i64, i64)> = cells.iter().map(|&(x, y)| (x as i64, y as i64)).collect();
    for generation in 0..40 {
        w = cpu::step(&w);
        naive = step_naive(&naive);
        let live: HashSet<(i64, i64)> = w.active.iter().map(|c| (c.x as i64, c.y as i64)).collect();
        assert_eq!(live, naive, "generation {generation}");
    }
}

#[test]
fn large_periodic_pattern_matches_naive() {
    let mut cells = Vec::new();
    for i in 0..100 {
        for j in 0..100 {
            if (i + j) % 7 == 0 {
                cells.push((i, j));
            }
        }
    }

    let mut w = world(&cells);
    let mut naive: HashSet<(i64, i64)> = cells.iter().map(|&(x, y)| (x as i64, y as i64)).collect();
    for generation in 0..5 {
        w = cpu::step(&w);
        naive = step_naive(&naive);
        let live: HashSet<(i64, i64)> = w.active.iter().map(|c| (c.x as i64, c.y as i64)).collect();
        assert_eq!(live, naive, "generation {generation}");
    }
}

#[test]
fn killed_cells_are_reevaluated() {
    let mut w = world(&BLOCK);
    assert!(w.kill_cell(Coord::new(1, 1)));
    assert!(!w.kill_cell(Coord::new(1, 1)));

    // Three cells of a block regrow the fourth.
    let next = cpu::step(&w);
    assert_eq!(next.active, world(&BLOCK).active);
}
