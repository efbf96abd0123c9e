use std::time::Duration;

use rust_vecenv::{
    ActorWorker, Backend, BatchStep, CounterEnv, DirectWorker, Env, EnvSpec, FrameStack, ProcessConfig, ProcessWorker,
    RemoteConfig, RenderFrame, Request, Seeds, VecEnvError, VectorConfig, VectorEnv, Worker, WorkerCommand, envs,
};

const WORKER: &str = env!("CARGO_BIN_EXE_vecenv-worker");

fn process_config() -> ProcessConfig {
    ProcessConfig::default().with_program(WORKER).with_timeout(Duration::from_secs(20))
}

fn backends() -> Vec<Backend> {
    vec![Backend::Direct, Backend::Process(process_config()), Backend::Remote(RemoteConfig::default())]
}

fn launch_all(specs: &[EnvSpec], reset_after_done: bool) -> Vec<VectorEnv<i64, i64>> {
    let registry = envs::builtin();
    backends()
        .iter()
        .map(|b| b.launch(specs, &registry, reset_after_done).unwrap_or_else(|e| panic!("{}: {e}", b.name())))
        .collect()
}

fn assert_same(batches: &[BatchStep<i64>]) {
    for other in &batches[1..] {
        assert_eq!(batches[0].observations, other.observations);
        assert_eq!(batches[0].rewards, other.rewards);
        assert_eq!(batches[0].dones, other.dones);
    }
}

// Eight identical counters with a small sleep, auto-reset on: every backend
// must produce the same batches for the same action schedule.
#[test]
fn backends_agree_with_auto_reset() {
    let specs: Vec<EnvSpec> =
        (0..8).map(|_| EnvSpec::new("Counter").with_kwarg("size", 10).with_kwarg("sleep_ms", 1)).collect();
    let mut venvs = launch_all(&specs, true);
    for v in &mut venvs {
        v.seed(Seeds::None).unwrap();
        assert_eq!(v.reset().unwrap(), vec![0; 8]);
    }

    let schedule: Vec<i64> = [vec![1; 5], vec![0; 10], vec![1; 15]].concat();
    for (t, &a) in schedule.iter().enumerate() {
        let batches: Vec<_> = venvs.iter_mut().map(|v| v.step(vec![a; 8]).unwrap()).collect();
        assert_same(&batches);
        // Step 25 reaches size 10 (5 up, 10 down to 0, 10 up): terminal reward, fresh observation.
        if t == 24 {
            assert_eq!(batches[0].observations, vec![0; 8]);
            assert_eq!(batches[0].rewards, vec![1.0; 8]);
            assert_eq!(batches[0].dones, vec![true; 8]);
        }
    }
    let last: Vec<_> = venvs.iter_mut().map(|v| v.step(vec![1; 8]).unwrap()).collect();
    assert_eq!(last[0].observations, vec![6; 8]);
    for v in &mut venvs {
        v.close();
        v.close();
    }
}

// Counters of sizes 1..=4 without auto-reset: slots finish at different
// times and keep repeating their terminal step while the others continue.
#[test]
fn backends_agree_without_auto_reset() {
    let specs: Vec<EnvSpec> = (1..=4).map(|s| EnvSpec::new("Counter").with_kwarg("size", s)).collect();
    let mut venvs = launch_all(&specs, false);
    for v in &mut venvs {
        v.reset().unwrap();
    }
    for t in 1..=6i64 {
        let batches: Vec<_> = venvs.iter_mut().map(|v| v.step(vec![1; 4]).unwrap()).collect();
        assert_same(&batches);
        let expected: Vec<i64> = (1..=4).map(|s| t.min(s)).collect();
        assert_eq!(batches[0].observations, expected);
        assert_eq!(batches[0].dones, (1..=4).map(|s| t >= s).collect::<Vec<_>>());
    }
    for v in &mut venvs {
        assert_eq!(v.reset().unwrap(), vec![0; 4]);
    }
}

// Workers that answer in reverse order still land in construction order.
#[test]
fn results_follow_construction_order() {
    let specs: Vec<EnvSpec> = (0..4)
        .map(|i| EnvSpec::new("Counter").with_kwarg("size", 10 + i).with_kwarg("sleep_ms", 40 - 10 * i))
        .collect();
    for mut v in launch_all(&specs, false) {
        v.reset().unwrap();
        let b = v.step(vec![1, 1, 0, 1]).unwrap();
        assert_eq!(b.observations, vec![1, 1, 0, 1]);
        let frames = v.render().unwrap();
        let texts: Vec<String> = frames
            .into_iter()
            .map(|f| match f {
                Some(RenderFrame::Text(t)) => t,
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["index=1/10", "index=1/11", "index=0/12", "index=1/13"]);
    }
}

#[test]
fn derived_seeds_give_identical_random_walks() {
    let specs: Vec<EnvSpec> = (0..4).map(|_| EnvSpec::new("RandomWalk").with_kwarg("bound", 3)).collect();
    let mut venvs = launch_all(&specs, true);
    for v in &mut venvs {
        v.seed(Seeds::Derived(2024)).unwrap();
        v.reset().unwrap();
    }
    for t in 0..40 {
        let action = [1, 0, -1][t % 3];
        let batches: Vec<_> = venvs.iter_mut().map(|v| v.step(vec![action; 4]).unwrap()).collect();
        assert_same(&batches);
    }
}

#[test]
fn step_after_done_is_a_usage_error_on_every_worker() {
    let registry = envs::builtin();
    let spec = EnvSpec::new("Counter").with_kwarg("size", 1);
    let mut workers: Vec<Box<dyn Worker<i64, i64>>> = Vec::new();
    workers.push(Box::new(DirectWorker::new(registry.make(&spec).unwrap())));
    let command = WorkerCommand::for_spec(WORKER, &spec);
    workers.push(Box::new(ProcessWorker::<i64, i64>::spawn(&command, &process_config()).unwrap()));
    let factory = registry.factory(&spec).unwrap();
    workers.push(Box::new(ActorWorker::spawn("usage", factory, &RemoteConfig::default()).unwrap()));
    for w in &mut workers {
        w.call(Request::Reset).unwrap();
        assert!(w.call(Request::Step(1)).unwrap().into_step().unwrap().done);
        let err = w.call(Request::Step(1)).unwrap_err();
        assert!(err.is_usage_error(), "{err}");
        assert!(!err.is_transport_failure());
        w.close();
    }
}

#[test]
fn frame_stack_keeps_usage_error() {
    let mut fs = FrameStack::new(CounterEnv::new(2), 3).unwrap();
    assert_eq!(fs.reset(), vec![0, 0, 0]);
    fs.step(1).unwrap();
    let s = fs.step(1).unwrap();
    assert_eq!(s.observation, vec![0, 1, 2]);
    assert!(s.done);
    assert!(matches!(fs.step(1), Err(VecEnvError::StepAfterDone)));
}

#[test]
fn construction_failure_names_the_slot() {
    let specs = vec![EnvSpec::new("Counter"), EnvSpec::new("Counter").with_kwarg("size", "lots")];
    for backend in backends() {
        let err = backend.launch(&specs, &envs::builtin(), false).err().unwrap();
        assert_eq!(err.worker_index(), Some(1), "{}", backend.name());
        assert!(matches!(err.root_cause(), VecEnvError::Construction(_)), "{}: {err}", backend.name());
    }
}

#[test]
fn unresponsive_remote_worker_times_out_the_batch() {
    let factories: Vec<_> = [0u64, 300]
        .into_iter()
        .map(|ms| move || Ok(CounterEnv::new(10).with_sleep(Duration::from_millis(ms))))
        .collect();
    let config = RemoteConfig::default().with_timeout(Duration::from_millis(100));
    let mut v = VectorEnv::remote(factories, false, &config).unwrap();
    v.reset().unwrap();
    let err = v.step(vec![1, 1]).unwrap_err();
    assert_eq!(err.worker_index(), Some(1));
    assert!(matches!(err.root_cause(), VecEnvError::Timeout(_)));
    v.close();
    assert!(matches!(v.reset(), Err(VecEnvError::Closed)));
}

#[test]
fn vector_config_launches_from_json() {
    let json = format!(
        r#"{{"reset_after_done": true, "backend": {{"kind": "process", "program": {WORKER:?}}}}}"#
    );
    let cfg = VectorConfig::from_json(&json).unwrap();
    let specs = vec![EnvSpec::new("Counter").with_kwarg("size", 1); 2];
    let mut v: VectorEnv<i64, i64> = cfg.launch(&specs, &envs::builtin()).unwrap();
    v.reset().unwrap();
    let b = v.step(vec![1, 1]).unwrap();
    assert_eq!(b.observations, vec![0, 0]);
    assert_eq!(b.dones, vec![true, true]);
}

#[cfg(unix)]
#[test]
fn crashed_child_fails_the_batch_at_its_index() {
    let commands = vec![
        WorkerCommand::for_spec(WORKER, &EnvSpec::new("Counter")),
        WorkerCommand::new("/bin/sh").arg("-c").arg("printf '\"Ready\"\\n'; read line; exit 9"),
    ];
    let mut v: VectorEnv<i64, i64> = VectorEnv::subprocess(&commands, false, &process_config()).unwrap();
    let err = v.reset().unwrap_err();
    assert_eq!(err.worker_index(), Some(1));
    assert!(err.is_transport_failure(), "{err}");
    v.close();
}
