use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use epidemic_dqn::agent::DqnAgent;
use epidemic_dqn::env::{EpidemicConfig, EpidemicGridEnv, Environment};

fn filled_agent(env: &mut EpidemicGridEnv, use_conv: bool) -> DqnAgent {
    let mut agent = DqnAgent::builder().use_conv(use_conv).seed(0).build(&*env).unwrap();
    let mut state = env.reset().unwrap();
    for _ in 0..256 {
        let action = env.sample_action();
        let step = env.step(action).unwrap();
        agent.replay_buffer.push(state.view(), action, step.reward, step.next_state.view(), step.done);
        state = if step.done { env.reset().unwrap() } else { step.next_state };
    }
    agent
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("dqn_update");
    let mut env = EpidemicGridEnv::new(EpidemicConfig { seed: Some(0), ..EpidemicConfig::default() }).unwrap();

    for use_conv in [true, false] {
        let mut agent = filled_agent(&mut env, use_conv);
        let name = if use_conv { "conv" } else { "dense" };
        for batch_size in [16, 64] {
            group.bench_with_input(BenchmarkId::new(name, batch_size), &batch_size, |b, &batch_size| {
                b.iter(|| agent.update(black_box(batch_size)).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_action_selection(c: &mut Criterion) {
    let mut env = EpidemicGridEnv::new(EpidemicConfig { seed: Some(1), ..EpidemicConfig::default() }).unwrap();
    let mut agent = DqnAgent::builder().seed(1).build(&env).unwrap();
    let state = env.reset().unwrap();
    c.bench_function("get_action_conv", |b| {
        b.iter(|| agent.get_action(&mut env, black_box(state.view()), 0.5, 0.3).unwrap())
    });
}

criterion_group!(benches, bench_update, bench_action_selection);
criterion_main!(benches);
