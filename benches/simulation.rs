use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use snake_arena::core::cell::Direction;
use snake_arena::game::state::ParticipantId;
use snake_arena::game::tick::{Simulation, SimulationConfig};

fn fresh_simulation(players: u8) -> (Simulation, Vec<ParticipantId>) {
    let ids: Vec<ParticipantId> = (1..=players).map(|i| ParticipantId::from_bytes([i; 16])).collect();
    let mut sim = Simulation::new(SimulationConfig::default(), 0xBEEF);
    sim.reset(&ids);
    (sim, ids)
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation_step");

    for players in [1u8, 4] {
        group.bench_function(format!("players{}_30_ticks", players), |b| {
            b.iter_batched(
                || fresh_simulation(players),
                |(mut sim, ids)| {
                    for t in 0..30usize {
                        let dir = [Direction::Up, Direction::Right, Direction::Down, Direction::Right][(t / 5) % 4];
                        if t % 5 == 0 {
                            for id in &ids {
                                sim.apply_intent(id, dir);
                            }
                        }
                        sim.step();
                    }
                    sim
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let (mut sim, _) = fresh_simulation(4);
    for _ in 0..10 {
        sim.step();
    }

    c.bench_function("snapshot_with_hash", |b| b.iter(|| sim.snapshot()));
}

criterion_group!(benches, bench_step, bench_snapshot);
criterion_main!(benches);
